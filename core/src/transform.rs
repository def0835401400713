//! Pass registry, by name.
use crate::errors::invalid;
use crate::floats::ConvertPrecision;
use crate::internal::*;
use crate::optim::{ConstantFolding, LowLatency, MakeStateful, UnrollTensorIterator};

/// Builds a pass from its name.
///
/// `make-stateful` takes its pairs after a colon:
/// `make-stateful:h=h_out,c=c_out`.
pub fn get_pass(spec: &str) -> Option<Box<dyn GraphPass>> {
    match spec {
        "constant-folding" => Some(Box::new(ConstantFolding)),
        "f32-to-f16" => Some(Box::new(ConvertPrecision::f32_to_f16())),
        "f32-to-f16-keep-io" => Some(Box::new(ConvertPrecision::f32_to_f16().keep_io(true))),
        "low-latency" => Some(Box::new(LowLatency)),
        "unroll-tensor-iterator" => Some(Box::new(UnrollTensorIterator)),
        spec if spec.starts_with("make-stateful:") => {
            let pairs = spec["make-stateful:".len()..]
                .split(',')
                .map(|pair| pair.split_once('='))
                .collect::<Option<Vec<_>>>()?;
            Some(Box::new(MakeStateful::new(pairs)))
        }
        _ => None,
    }
}

impl PassManager {
    pub fn from_names(names: &[impl AsRef<str>]) -> GraftResult<PassManager> {
        let mut manager = PassManager::new();
        for name in names {
            let name = name.as_ref();
            let pass = get_pass(name).ok_or_else(|| invalid(format!("Unknown pass {name:?}")))?;
            manager.register_boxed(pass);
        }
        Ok(manager)
    }
}
