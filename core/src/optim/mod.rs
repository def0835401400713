//! Graph passes and the pass manager running them.
use crate::internal::*;
use std::fmt::Debug;

mod low_latency;
mod make_stateful;
mod prop_const;
mod unroll;

pub use self::low_latency::LowLatency;
pub use self::make_stateful::MakeStateful;
pub use self::prop_const::ConstantFolding;
pub use self::unroll::{unroll_one, UnrollTensorIterator};

/// A graph rewriting unit.
///
/// `run` reports whether it modified the graph. On failure the pass
/// manager discards whatever the pass did.
pub trait GraphPass: Debug + Send + Sync + dyn_clone::DynClone {
    fn name(&self) -> Cow<'_, str>;
    fn run(&mut self, model: &mut Graph) -> GraftResult<bool>;
}

dyn_clone::clone_trait_object!(GraphPass);

/// Ordered pipeline of passes.
#[derive(Debug, Clone, Default)]
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
    fixpoint: Option<usize>,
}

impl PassManager {
    pub fn new() -> PassManager {
        PassManager::default()
    }

    pub fn register(&mut self, pass: impl GraphPass + 'static) -> &mut PassManager {
        self.register_boxed(Box::new(pass))
    }

    pub fn register_boxed(&mut self, pass: Box<dyn GraphPass>) -> &mut PassManager {
        self.passes.push(pass);
        self
    }

    /// Reruns the whole pipeline until no pass modifies the graph, at most
    /// `max_rounds` times.
    pub fn with_fixpoint(self, max_rounds: usize) -> PassManager {
        PassManager { fixpoint: Some(max_rounds), ..self }
    }

    pub fn passes(&self) -> &[Box<dyn GraphPass>] {
        &self.passes
    }

    /// Applies every pass once, in registration order. Stops at the first
    /// failing pass, leaving the graph as the previous pass left it.
    pub fn run(&mut self, model: &mut Graph) -> GraftResult<()> {
        let rounds = self.fixpoint.unwrap_or(1).max(1);
        for round in 0..rounds {
            let mut modified = false;
            for pass in self.passes.iter_mut() {
                modified |= run_pass(pass.as_mut(), model)
                    .with_context(|| format!("Running pass {}", pass.name()))?;
            }
            if !modified {
                break;
            }
            debug!("Round {round} modified {:?}", model.name);
        }
        Ok(())
    }
}

/// Runs a pass on a copy of the graph, committed only if the pass succeeds.
pub fn run_pass(pass: &mut dyn GraphPass, model: &mut Graph) -> GraftResult<bool> {
    let mut candidate = model.clone();
    let modified = pass.run(&mut candidate)?;
    debug!("Pass {} on {:?}: modified={}", pass.name(), model.name, modified);
    *model = candidate;
    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct CountingNeg(usize);

    impl GraphPass for CountingNeg {
        fn name(&self) -> Cow<'_, str> {
            "counting-neg".into()
        }

        fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
            if self.0 >= 2 {
                return Ok(false);
            }
            self.0 += 1;
            let outlet = model.result_outlet(0)?;
            let neg = model.wire_node(model.unique_name("neg"), ElementWiseOp::Neg, &[outlet])?;
            model.shunt(outlet, neg[0])?;
            Ok(true)
        }
    }

    #[derive(Debug, Clone)]
    struct Failing;

    impl GraphPass for Failing {
        fn name(&self) -> Cow<'_, str> {
            "failing".into()
        }

        fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
            let outlet = model.result_outlet(0)?;
            model.wire_node("dangling", ElementWiseOp::Abs, &[outlet])?;
            bail!(GraphError::UnsupportedOp("nope".into()))
        }
    }

    fn model() -> GraftResult<Graph> {
        let mut model = Graph::default();
        let input = model.add_parameter("input", f32::fact([2]))?;
        model.add_result("output", input)?;
        Ok(model)
    }

    #[test]
    fn runs_once_without_fixpoint() -> GraftResult<()> {
        let mut model = model()?;
        PassManager::new().register(CountingNeg::default()).run(&mut model)?;
        assert_eq!(model.len(), 3);
        Ok(())
    }

    #[test]
    fn fixpoint() -> GraftResult<()> {
        let mut model = model()?;
        let mut manager = PassManager::new().with_fixpoint(10);
        manager.register(CountingNeg::default());
        manager.run(&mut model)?;
        assert_eq!(model.len(), 4);
        Ok(())
    }

    #[test]
    fn failure_leaves_graph_untouched() -> GraftResult<()> {
        let mut model = model()?;
        let before = model.clone();
        let mut manager = PassManager::new();
        manager.register(CountingNeg::default()).register(Failing);
        let err = manager.run(&mut model).unwrap_err();
        assert_eq!(GraphError::find(&err), Some(&GraphError::UnsupportedOp("nope".into())));
        assert_eq!(model.len(), before.len() + 1);
        assert!(model.nodes().all(|n| n.name != "dangling"));
        Ok(())
    }
}
