//! Helpers for joining monitor tasks

use tokio::task::JoinError;

/// How did a supervised task end?
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Exit {
    /// Returned normally, or was cancelled.
    Stopped,
    /// Panicked, with the panic's message.
    Panicked(String),
}

pub(crate) fn classify(result: Result<(), JoinError>) -> Exit {
    match result {
        // Success or cancellation: Quietly stop
        Ok(()) => Exit::Stopped,
        Err(err) if err.is_cancelled() => Exit::Stopped,
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "panic with a non-string payload".to_string()
            };
            Exit::Panicked(message)
        }
        Err(err) => Exit::Panicked(format!("unexpected join error: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Exit};

    #[tokio::test]
    async fn panics_carry_their_message() {
        let handle = tokio::task::spawn(async {
            panic!("monitor exploded");
        });
        assert_eq!(
            classify(handle.await),
            Exit::Panicked("monitor exploded".to_string())
        );

        let name = "lb.example.com";
        let handle = tokio::task::spawn(async move {
            panic!("{name} exploded");
        });
        assert_eq!(
            classify(handle.await),
            Exit::Panicked("lb.example.com exploded".to_string())
        );
    }

    #[tokio::test]
    async fn cancellation_is_a_quiet_stop() {
        let handle = tokio::task::spawn(futures::future::pending::<()>());
        handle.abort();
        assert_eq!(classify(handle.await), Exit::Stopped);
    }
}
