//! Liveness-based pruning.
//!
//! Hardware objects connect asynchronously after construction and some never
//! come online. [`Registry::pop_disconnected`] gives every root device the
//! same bounded window to report connected and drops the ones that don't.

use crate::registry::Registry;
use daq_device::DeviceRef;
use futures::future::join_all;
use std::time::Duration;

impl Registry {
    /// Remove root devices that do not connect within `timeout`.
    ///
    /// All roots are probed concurrently, so the call takes about `timeout`
    /// no matter how many devices are registered. A timed-out probe counts
    /// as "not connected", never as an error. Sub-components of a removed
    /// root are removed with it; only the roots are returned.
    ///
    /// Only root devices are probed. A sub-component whose root reports
    /// connected stays registered even if it is offline itself.
    pub async fn pop_disconnected(&self, timeout: Duration) -> Vec<DeviceRef> {
        let roots = self.root_devices();
        tracing::debug!(
            roots = roots.len(),
            ?timeout,
            "Probing device connections"
        );

        let probes = roots.into_iter().map(|device| async move {
            let connected = tokio::time::timeout(timeout, device.wait_for_connection())
                .await
                .is_ok();
            (device, connected)
        });
        let outcomes = join_all(probes).await;

        let disconnected: Vec<DeviceRef> = outcomes
            .into_iter()
            .filter_map(|(device, connected)| (!connected).then_some(device))
            .collect();

        if !disconnected.is_empty() {
            let snapshot = self.snapshot();
            for device in &disconnected {
                let removed = self.remove_tree(&snapshot, device);
                tracing::debug!(device = %device.name(), removed, "Pruned disconnected device");
            }
        }
        disconnected
    }

    /// [`Registry::pop_disconnected`] with the configured `connection_timeout`.
    pub async fn prune(&self) -> Vec<DeviceRef> {
        self.pop_disconnected(self.connection_timeout()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::{Registry, RegistryConfig};
    use daq_device::InstantiationBus;
    use daq_driver_mock::{MockMotor, MockSignal};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_connected_devices_survive() {
        let bus = InstantiationBus::new();
        let registry = Registry::builder().bus(&bus).build().unwrap();
        let _m1 = MockMotor::builder("m1").bus(&bus).build();
        let _bad = MockSignal::builder("bad").connected(false).bus(&bus).build();

        let start = Instant::now();
        let removed = registry.pop_disconnected(Duration::from_millis(500)).await;

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name(), "bad");
        assert!(registry.contains("m1"));
        assert!(registry.contains("m1_user_readback"));
        assert!(!registry.contains("bad"));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_sub_component_of_connected_root_is_kept() {
        let bus = InstantiationBus::new();
        let registry = Registry::builder().bus(&bus).build().unwrap();
        let m1 = MockMotor::builder("m1").bus(&bus).build();
        m1.user_readback().set_connected(false);

        let removed = registry.pop_disconnected(Duration::from_millis(100)).await;

        assert!(removed.is_empty());
        assert!(registry.contains("m1"));
        assert!(registry.contains("m1_user_readback"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_uses_configured_timeout() {
        let bus = InstantiationBus::new();
        let config = RegistryConfig {
            connection_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let registry = Registry::builder().config(config).bus(&bus).build().unwrap();
        let _bad = MockSignal::builder("bad").connected(false).bus(&bus).build();

        let start = Instant::now();
        let removed = registry.prune().await;
        assert_eq!(removed.len(), 1);
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_registry() {
        let registry = Registry::builder()
            .bus(&InstantiationBus::new())
            .build()
            .unwrap();
        assert!(registry.pop_disconnected(Duration::from_secs(1)).await.is_empty());
    }
}
