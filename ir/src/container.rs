use graft_core::internal::*;
use std::path::{Path, PathBuf};

/// Payload path used when none is given: the description path with a
/// `.bin` extension.
pub fn default_payload_path(description: impl AsRef<Path>) -> PathBuf {
    description.as_ref().with_extension("bin")
}

pub fn save(
    model: &Graph,
    description: impl AsRef<Path>,
    payload: impl AsRef<Path>,
) -> GraftResult<()> {
    let (description, payload) = (description.as_ref(), payload.as_ref());
    let (text, bytes) = crate::serialize(model)?;
    std::fs::write(description, text).with_context(|| format!("Writing {description:?}"))?;
    std::fs::write(payload, bytes).with_context(|| format!("Writing {payload:?}"))?;
    Ok(())
}

pub fn load(description: impl AsRef<Path>, payload: impl AsRef<Path>) -> GraftResult<Graph> {
    let (description, payload) = (description.as_ref(), payload.as_ref());
    if !description.exists() {
        bail!("File not found: {:?}", description)
    }
    let text = std::fs::read_to_string(description)
        .with_context(|| format!("Reading {description:?}"))?;
    let bytes = if payload.exists() {
        std::fs::read(payload).with_context(|| format!("Reading {payload:?}"))?
    } else {
        vec![]
    };
    crate::deserialize(&text, &bytes)
}

/// Writes the graph to disk. Does not modify it.
#[derive(Clone, Debug)]
pub struct Serialize {
    pub description: PathBuf,
    pub payload: Option<PathBuf>,
}

impl Serialize {
    pub fn new(description: impl Into<PathBuf>) -> Serialize {
        Serialize { description: description.into(), payload: None }
    }

    pub fn with_payload(self, payload: impl Into<PathBuf>) -> Serialize {
        Serialize { payload: Some(payload.into()), ..self }
    }

    pub fn payload_path(&self) -> PathBuf {
        self.payload.clone().unwrap_or_else(|| default_payload_path(&self.description))
    }
}

impl GraphPass for Serialize {
    fn name(&self) -> Cow<'_, str> {
        "serialize".into()
    }

    fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
        save(model, &self.description, self.payload_path())?;
        Ok(false)
    }
}
