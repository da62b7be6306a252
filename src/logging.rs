use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{error, info, warn};

use crate::error::Error;

/// Initialise the global logger from a log4rs YAML file such as the shipped `log4rs.yaml`.
pub fn init_file(path: impl AsRef<Path>) -> anyhow::Result<()> {
    log4rs::init_file(path, Default::default())?;
    info!("Initialised logging");
    Ok(())
}

/// A unique identifier for a single mutating store operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct OperationId(pub usize);

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OperationId {
    /// Atomically get the next ID. This wraps around back to zero if you somehow exceed a usize.
    pub fn next() -> OperationId {
        static OPERATION_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        OperationId(OPERATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Log the start of an operation and return its ID.
    pub(crate) fn begin(name: &str, subject: impl Display) -> OperationId {
        let id = Self::next();
        info!("->op{id} {name} {subject}");
        id
    }

    /// Log the outcome of an operation, passing the result through.
    pub(crate) fn finish<T>(self, name: &str, result: crate::Result<T>) -> crate::Result<T> {
        let id = self;
        match &result {
            Ok(_) => info!("<-op{id} {name} ok"),
            Err(err) if err.is_business() => warn!("<-op{id} {name} rejected: {err}"),
            Err(err @ Error::Integrity(_)) => error!("<-op{id} {name} integrity failure: {err}"),
            Err(err) if err.is_transient() => warn!("<-op{id} {name} lost a write conflict: {err}"),
            Err(err) => error!("<-op{id} {name} failed: {err}"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use log4rs::config::{load_config_file, Deserializers};

    use super::*;

    #[test]
    fn operation_ids_increase() {
        let first = OperationId::next();
        let second = OperationId::next();
        assert!(second > first);
    }

    #[test]
    fn finish_passes_result_through() {
        let id = OperationId::begin("test_op", 1);
        let ok: crate::Result<u32> = id.finish("test_op", Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let id = OperationId::begin("test_op", 2);
        let err: crate::Result<u32> = id.finish("test_op", Err(Error::not_found("Position 2")));
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn shipped_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/log4rs.yaml");
        let config = load_config_file(path, Deserializers::default()).unwrap();
        assert_eq!(config.root().appenders(), ["stdout", "logfile"]);
    }
}
