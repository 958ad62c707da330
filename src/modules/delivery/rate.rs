// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::modules::{
    campaign::entity::Attachment,
    delivery::{
        classifier::{ErrorClass, ErrorClassifier, PatternClassifier},
        transport::TransportError,
    },
    settings::cli::Settings,
};

pub const MB: u64 = 1_048_576;
const RECOVERY_FACTOR: f64 = 0.9;

#[derive(Clone, Debug, PartialEq)]
pub struct RateControlConfig {
    pub base_delay: f64,
    pub min_delay: f64,
    pub max_delay: f64,
    pub max_consecutive_backoffs: u32,
    pub recovery_window: Duration,
}

impl Default for RateControlConfig {
    fn default() -> Self {
        Self {
            base_delay: 0.1,
            min_delay: 0.01,
            max_delay: 5.0,
            max_consecutive_backoffs: 5,
            recovery_window: Duration::from_secs(60),
        }
    }
}

impl RateControlConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_delay: settings.mailcast_base_delay_seconds,
            min_delay: settings.mailcast_min_delay_seconds,
            max_delay: settings.mailcast_max_delay_seconds,
            max_consecutive_backoffs: settings.mailcast_max_consecutive_backoffs,
            recovery_window: Duration::from_secs(
                settings.mailcast_throttle_recovery_window_seconds,
            ),
        }
    }

    fn clamp(&self, seconds: f64) -> f64 {
        seconds.max(self.min_delay).min(self.max_delay)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateStats {
    /// Seconds actually slept before sends.
    pub total_delay: f64,
    pub throttle_count: u64,
    pub attachment_delay_count: u64,
}

/// Per-invocation delay state. Created fresh for every batch and owned by
/// the worker; never shared between invocations.
pub struct RateController {
    config: RateControlConfig,
    classifier: Arc<dyn ErrorClassifier>,
    current_delay: f64,
    consecutive_backoffs: u32,
    last_throttle_time: Option<Instant>,
    last_recovery_time: Option<Instant>,
    stats: RateStats,
}

impl RateController {
    pub fn new(config: RateControlConfig, classifier: Arc<dyn ErrorClassifier>) -> Self {
        let current_delay = config.clamp(config.base_delay);
        Self {
            config,
            classifier,
            current_delay,
            consecutive_backoffs: 0,
            last_throttle_time: None,
            last_recovery_time: None,
            stats: RateStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            RateControlConfig::default(),
            Arc::new(PatternClassifier::default()),
        )
    }

    pub fn config(&self) -> &RateControlConfig {
        &self.config
    }

    pub fn current_delay(&self) -> f64 {
        self.current_delay
    }

    pub fn consecutive_backoffs(&self) -> u32 {
        self.consecutive_backoffs
    }

    pub fn stats(&self) -> RateStats {
        self.stats.clone()
    }

    /// 0 bytes: 1.0, up to 1MB: 1.5, up to 5MB: 2.0, up to 10MB: 3.0,
    /// beyond: whatever reaches `max_delay`.
    pub fn multiplier_for_bytes(&self, total_bytes: u64) -> f64 {
        match total_bytes {
            0 => 1.0,
            b if b <= MB => 1.5,
            b if b <= 5 * MB => 2.0,
            b if b <= 10 * MB => 3.0,
            _ => self.config.max_delay / self.config.base_delay,
        }
    }

    pub fn delay_for_bytes(&mut self, total_bytes: u64) -> f64 {
        let multiplier = self.multiplier_for_bytes(total_bytes);
        if multiplier > 1.0 {
            self.stats.attachment_delay_count += 1;
        }
        self.config.clamp(self.config.base_delay * multiplier)
    }

    pub fn delay_for_attachments(&mut self, attachments: &[Attachment]) -> f64 {
        let total_bytes = attachments.iter().map(|a| a.size_bytes).sum();
        self.delay_for_bytes(total_bytes)
    }

    pub fn classify(&self, error: &TransportError) -> ErrorClass {
        self.classifier.classify(error)
    }

    pub fn is_throttle_signal(&self, error: &TransportError) -> bool {
        self.classify(error) == ErrorClass::Throttle
    }

    pub fn on_throttle_detected(&mut self) {
        self.on_throttle_detected_at(Instant::now())
    }

    pub fn on_throttle_detected_at(&mut self, now: Instant) {
        let cap = self.config.max_consecutive_backoffs;
        self.consecutive_backoffs = self.consecutive_backoffs.saturating_add(1).min(cap);
        self.current_delay = if self.consecutive_backoffs >= cap {
            self.config.max_delay
        } else {
            self.config.clamp(self.current_delay * 2.0)
        };
        self.stats.throttle_count += 1;
        self.last_throttle_time = Some(now);

        if self.consecutive_backoffs >= cap {
            warn!(
                "Backoff cap of {} reached, delay pinned at {:.3}s",
                cap, self.current_delay
            );
        } else {
            info!(
                "Throttle detected, delay raised to {:.3}s (backoff {}/{})",
                self.current_delay, self.consecutive_backoffs, cap
            );
        }
    }

    pub fn maybe_recover(&mut self) -> bool {
        self.maybe_recover_at(Instant::now())
    }

    /// Decays the delay by 10% once a full recovery window has passed without
    /// a throttle. Decays at most once per window.
    pub fn maybe_recover_at(&mut self, now: Instant) -> bool {
        if self.current_delay <= self.config.base_delay {
            return false;
        }
        let window = self.config.recovery_window;
        let Some(last_throttle) = self.last_throttle_time else {
            return false;
        };
        if now.saturating_duration_since(last_throttle) < window {
            return false;
        }
        if let Some(last_recovery) = self.last_recovery_time {
            if now.saturating_duration_since(last_recovery) < window {
                return false;
            }
        }

        let previous = self.current_delay;
        self.current_delay = (self.current_delay * RECOVERY_FACTOR).max(self.config.min_delay);
        self.consecutive_backoffs = 0;
        self.last_recovery_time = Some(now);
        debug!(
            "No throttling for {:?}, delay reduced {:.3}s -> {:.3}s",
            window, previous, self.current_delay
        );
        true
    }

    /// The larger of the attachment-driven and throttle-driven delays.
    pub fn next_delay(&mut self, attachments: &[Attachment]) -> f64 {
        self.delay_for_attachments(attachments).max(self.current_delay)
    }

    pub fn record_applied_delay(&mut self, seconds: f64) {
        if seconds > 0.0 {
            self.stats.total_delay += seconds;
        }
    }
}
