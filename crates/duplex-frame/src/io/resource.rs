use tracing::warn;

use crate::{FrameError, Result};

/// A successful result together with the release failures met on the way.
#[derive(Debug)]
#[must_use]
pub struct Released<T> {
    pub value: T,
    pub warnings: Vec<FrameError>,
}

impl<T> Released<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Returns `true` if every resource was released.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Run `body` against `resource`, then always hand it to `release`.
///
/// A release failure after a successful body is returned as a warning; after
/// a failed body it is attached to the body's error.
pub(crate) fn scoped<R, T>(
    resource: R,
    body: impl FnOnce(&mut R) -> Result<T>,
    release: impl FnOnce(R) -> Result<()>,
) -> Result<Released<T>> {
    let mut resource = resource;
    let outcome = body(&mut resource);
    let released = release(resource);
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(Released::clean(value)),
        (Ok(value), Err(e)) => {
            warn!(error = %e, "resource release failed");
            Ok(Released {
                value,
                warnings: vec![e],
            })
        }
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(e)) => {
            warn!(error = %e, primary = %primary, "resource release failed while unwinding");
            Err(primary.with_release_failures(vec![e]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn release_error() -> FrameError {
        FrameError::resource_handle("sink", std::io::Error::other("disk full"))
    }

    #[test]
    fn release_runs_after_success() {
        let mut closed = false;
        let out = scoped(
            1,
            |r| Ok(*r + 1),
            |_| {
                closed = true;
                Ok(())
            },
        )
        .unwrap();
        assert!(closed);
        assert!(out.is_clean());
        assert_eq!(out.into_value(), 2);
    }

    #[test]
    fn release_failure_after_success_is_a_warning() {
        let out = scoped((), |_| Ok("done"), |_| Err(release_error())).unwrap();
        assert_eq!(out.value, "done");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind(), ErrorKind::ResourceHandle);
    }

    #[test]
    fn release_failure_while_unwinding_keeps_the_primary_error() {
        let err = scoped(
            (),
            |_| -> Result<()> { Err(FrameError::invalid_operation("boom")) },
            |_| Err(release_error()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let FrameError::WithReleaseFailures { secondary, .. } = err else {
            panic!("expected release failures to be attached");
        };
        assert_eq!(secondary.len(), 1);
    }
}
