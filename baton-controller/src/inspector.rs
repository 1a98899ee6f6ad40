use baton_protocol::TestDuration;

/// Sentinel returned by [`Inspector::started_epoch_millis`] while the
/// inspector is not running.
pub const NOT_RUNNING: i64 = -1;

/// Management-interface boundary for broker introspection.
///
/// Broker-specific implementations (Artemis JMX, Interconnect AMQP
/// management, ...) live outside this crate. From the executor's point of
/// view an inspector is just another peer: it is resolved, started and
/// awaited like senders and receivers, and this trait only covers driving
/// the management connection itself.
pub trait Inspector: Send {
    fn set_url(&mut self, url: &str);
    fn set_credentials(&mut self, user: &str, password: &str);
    fn set_worker_options(&mut self, duration: &TestDuration);

    /// Starts the inspection loop; returns the exit code once it ends.
    fn start(&mut self) -> anyhow::Result<i32>;
    fn stop(&mut self) -> anyhow::Result<()>;

    /// Epoch millis of the current run's start, or [`NOT_RUNNING`].
    fn started_epoch_millis(&self) -> i64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeInspector {
        url: Option<String>,
        started_at: Option<i64>,
    }

    impl Inspector for FakeInspector {
        fn set_url(&mut self, url: &str) {
            self.url = Some(url.to_string());
        }

        fn set_credentials(&mut self, _user: &str, _password: &str) {}

        fn set_worker_options(&mut self, _duration: &TestDuration) {}

        fn start(&mut self) -> anyhow::Result<i32> {
            anyhow::ensure!(self.url.is_some(), "url not configured");
            self.started_at = Some(1_700_000_000_000);
            Ok(0)
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            self.started_at = None;
            Ok(())
        }

        fn started_epoch_millis(&self) -> i64 {
            self.started_at.unwrap_or(NOT_RUNNING)
        }
    }

    #[test]
    fn not_running_sentinel_before_start_and_after_stop() {
        let mut inspector = FakeInspector::default();
        assert_eq!(inspector.started_epoch_millis(), NOT_RUNNING);
        assert!(inspector.start().is_err());

        inspector.set_url("http://broker:8161/console/jolokia");
        assert_eq!(inspector.start().unwrap(), 0);
        assert_ne!(inspector.started_epoch_millis(), NOT_RUNNING);

        inspector.stop().unwrap();
        assert_eq!(inspector.started_epoch_millis(), NOT_RUNNING);
    }
}
