use crate::internal::*;
use std::collections::BTreeSet;

/// Handle to a node in a `Graph`.
///
/// The generation tells apart successive nodes occupying the same arena
/// slot: a handle to a removed node never resolves to its replacement.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId {
    pub(crate) slot: usize,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.generation == 0 {
            write!(fmt, "#{}", self.slot)
        } else {
            write!(fmt, "#{}.{}", self.slot, self.generation)
        }
    }
}

/// Identify the output of a node, by node id and output slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct OutletId {
    pub node: NodeId,
    pub slot: usize,
}

impl fmt::Debug for OutletId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}/{}>", self.node, self.slot)
    }
}

impl From<NodeId> for OutletId {
    fn from(node: NodeId) -> OutletId {
        OutletId::new(node, 0)
    }
}

/// Identify an input of a node, by node id and input slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct InletId {
    pub node: NodeId,
    pub slot: usize,
}

impl fmt::Debug for InletId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, ">{}/{}", self.node, self.slot)
    }
}

/// Information for each outlet of a node
#[derive(Clone, Debug)]
pub struct Outlet {
    /// the tensor type information
    pub fact: TypedFact,
    /// where this outlet is used.
    pub successors: TVec<InletId>,
    /// tensor names, unique over the whole graph once serialized
    pub names: BTreeSet<String>,
}

impl Outlet {
    pub fn new(fact: TypedFact) -> Outlet {
        Outlet { fact, successors: tvec!(), names: BTreeSet::new() }
    }
}

/// A Node in a graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    /// name of the node, purely informative
    pub name: String,
    pub op: OpKind,
    /// the node inputs, in slot order
    pub inputs: TVec<OutletId>,
    pub outputs: TVec<Outlet>,
}

impl Node {
    pub fn output_facts(&self) -> TVec<&TypedFact> {
        self.outputs.iter().map(|o| &o.fact).collect()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} \"{}\" {}", self.id, self.name, self.op.name())
    }
}
