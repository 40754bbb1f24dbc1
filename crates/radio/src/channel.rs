//! Per-link delivery model: uniform latency and independent loss

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution, Uniform};
use log::{info, trace, warn};
use swarmlink_core::Envelope;

use crate::node::Peer;
use crate::{ChannelConfig, MeshError};

/// Result of one delivery attempt. The delay elapses in both cases; a lost
/// message is only known to be lost once the link would have delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { delay: Duration },
    Dropped { delay: Duration },
}

impl DeliveryOutcome {
    pub fn delay(&self) -> Duration {
        match self {
            DeliveryOutcome::Delivered { delay } | DeliveryOutcome::Dropped { delay } => *delay,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub attempted: u64,
    pub delivered: u64,
    pub dropped: u64,
    /// Deliveries whose target inbox no longer existed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

pub struct Channel {
    config: ChannelConfig,
    latency: Uniform<Duration>,
    loss: Bernoulli,
    rng: Mutex<StdRng>,
    counters: Counters,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Result<Self, MeshError> {
        config.validate()?;
        let latency = Uniform::new_inclusive(config.min_latency, config.max_latency)
            .map_err(|e| MeshError::InvalidConfig(format!("latency range: {}", e)))?;
        let loss = Bernoulli::new(config.loss_probability)
            .map_err(|e| MeshError::InvalidConfig(format!("loss_probability: {}", e)))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        info!("Channel initialized with config: {:?}", config);

        Ok(Self {
            config,
            latency,
            loss,
            rng: Mutex::new(rng),
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Draws the fate of a single transmission without performing it.
    pub fn attempt(&self) -> DeliveryOutcome {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let delay = self.latency.sample(&mut *rng);
        if self.loss.sample(&mut *rng) {
            DeliveryOutcome::Dropped { delay }
        } else {
            DeliveryOutcome::Delivered { delay }
        }
    }

    /// Runs one full delivery attempt: wait out the link latency, then either
    /// append to the target's inbox or lose the message. Meant to run on its
    /// own task; nothing is reported back to the sender.
    pub async fn attempt_delivery(&self, envelope: Envelope, target: &Peer) -> DeliveryOutcome {
        self.counters.attempted.fetch_add(1, Ordering::Relaxed);
        let outcome = self.attempt();
        trace!("{} → {}: in flight for {:?}", envelope.sender, target.id(), outcome.delay());

        tokio::time::sleep(outcome.delay()).await;

        match outcome {
            DeliveryOutcome::Dropped { .. } => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                info!("{} → {}: Message lost", envelope.sender, target.id());
            }
            DeliveryOutcome::Delivered { .. } => {
                let sender = envelope.sender.clone();
                let payload = envelope.payload.clone();
                match target.deliver(envelope) {
                    Ok(()) => {
                        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                        info!("{} → {}: {}", sender, target.id(), payload);
                    }
                    Err(_) => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("{} → {}: inbox closed, delivery failed", sender, target.id());
                    }
                }
            }
        }
        outcome
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            attempted: self.counters.attempted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmlink_core::MessageId;
    use tokio::sync::mpsc;

    fn seeded(loss_probability: f64) -> Channel {
        Channel::new(ChannelConfig {
            loss_probability,
            seed: Some(42),
            ..Default::default()
        })
        .unwrap()
    }

    fn envelope(payload: &str) -> Envelope {
        Envelope::new(MessageId::new("Drone-1".into(), 0), payload)
    }

    #[test]
    fn test_delay_within_latency_range() {
        let channel = seeded(0.5);
        let config = channel.config().clone();
        for _ in 0..1_000 {
            let delay = channel.attempt().delay();
            assert!(delay >= config.min_latency && delay <= config.max_latency, "delay {:?}", delay);
        }
    }

    #[test]
    fn test_loss_rate_converges() {
        let channel = seeded(0.05);
        let trials = 10_000;
        let dropped = (0..trials).filter(|_| !channel.attempt().is_delivered()).count();
        let rate = dropped as f64 / trials as f64;
        assert!((0.03..=0.07).contains(&rate), "observed loss rate {}", rate);
    }

    #[test]
    fn test_extreme_probabilities() {
        let lossless = seeded(0.0);
        assert!((0..500).all(|_| lossless.attempt().is_delivered()));

        let dead = seeded(1.0);
        assert!((0..500).all(|_| !dead.attempt().is_delivered()));
    }

    #[test]
    fn test_same_seed_same_draws() {
        let a = seeded(0.3);
        let b = seeded(0.3);
        for _ in 0..100 {
            assert_eq!(a.attempt(), b.attempt());
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = Channel::new(ChannelConfig { loss_probability: 2.0, ..Default::default() });
        assert!(matches!(result, Err(MeshError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_waits_for_latency() {
        let channel = seeded(0.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let target = Peer::new("Drone-2".into(), tx);

        let start = tokio::time::Instant::now();
        let outcome = channel.attempt_delivery(envelope("Ozone level normal"), &target).await;
        let elapsed = start.elapsed();

        assert!(outcome.is_delivered());
        assert!(elapsed >= outcome.delay());
        let received = rx.try_recv().unwrap();
        assert_eq!(received.payload, "Ozone level normal");
        assert_eq!(channel.stats(), ChannelStats { attempted: 1, delivered: 1, dropped: 0, failed: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_has_one_outcome() {
        let channel = seeded(0.4);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let target = Peer::new("Satellite-1".into(), tx);

        let mut delivered = 0;
        for _ in 0..200 {
            if channel.attempt_delivery(envelope("status"), &target).await.is_delivered() {
                delivered += 1;
            }
        }

        let stats = channel.stats();
        assert_eq!(stats.attempted, 200);
        assert_eq!(stats.delivered + stats.dropped, 200);
        assert_eq!(stats.delivered, delivered);

        let mut in_inbox = 0;
        while rx.try_recv().is_ok() {
            in_inbox += 1;
        }
        assert_eq!(in_inbox, delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_inbox_counts_as_failed() {
        let channel = seeded(0.0);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let target = Peer::new("Drone-9".into(), tx);

        let outcome = channel.attempt_delivery(envelope("ALERT"), &target).await;
        assert!(outcome.is_delivered());
        assert_eq!(channel.stats().failed, 1);
        assert_eq!(channel.stats().delivered, 0);
    }
}
