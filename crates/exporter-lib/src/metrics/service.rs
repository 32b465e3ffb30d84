//! Service status series from `/status/v1/services`

use super::{gauge_vec, set_present, NAMESPACE};
use crate::models::ServiceInfo;
use prometheus::{GaugeVec, Registry};

pub struct ServiceMetrics {
    up: GaugeVec,
    info: GaugeVec,
    queue_depth: GaugeVec,
}

impl ServiceMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            up: gauge_vec(
                registry,
                NAMESPACE,
                "service_up",
                "Whether service is running (1=running, 0=not running)",
                &["service", "version"],
            )?,
            info: gauge_vec(
                registry,
                NAMESPACE,
                "service_info",
                "Service version and state (always 1)",
                &["service", "version", "state"],
            )?,
            queue_depth: gauge_vec(
                registry,
                NAMESPACE,
                "service_queue_depth",
                "Service queue depth (number of unprocessed tasks)",
                &["service"],
            )?,
        })
    }

    pub fn reset(&self) {
        self.up.reset();
        self.info.reset();
        self.queue_depth.reset();
    }

    pub fn update(&self, services: &[ServiceInfo]) {
        for svc in services {
            self.up
                .with_label_values(&[&svc.name, &svc.version])
                .set(if svc.up { 1.0 } else { 0.0 });
            self.info
                .with_label_values(&[&svc.name, &svc.version, &svc.state])
                .set(1.0);
            set_present(&self.queue_depth, &[&svc.name], svc.queue_depth);
        }
    }
}
