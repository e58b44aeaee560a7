//! Status reporting hook, purely for observability.

/// Receives `(task_index, message)` at loop start, each iteration boundary,
/// completion, timeout and error. Implementations must not panic and have no
/// way to influence control flow.
pub trait StatusReporter: Send + Sync {
    fn report(&self, task_index: usize, message: &str);
}

impl<F> StatusReporter for F
where
    F: Fn(usize, &str) + Send + Sync,
{
    fn report(&self, task_index: usize, message: &str) {
        self(task_index, message);
    }
}

/// Discards every status update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusReporter;

impl StatusReporter for NullStatusReporter {
    fn report(&self, _task_index: usize, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |index: usize, message: &str| {
            seen.lock().unwrap().push(format!("{index}:{message}"));
        };
        reporter.report(2, "started");
        NullStatusReporter.report(3, "ignored");
        assert_eq!(*seen.lock().unwrap(), vec!["2:started".to_string()]);
    }
}
