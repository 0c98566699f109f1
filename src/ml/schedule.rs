// ============================================================
// Layer 5 — Epoch Callbacks
// ============================================================
// Three decisions are taken at the end of every epoch from the
// validation metrics:
//
//   1. Checkpoint   — save weights when val_IoU reaches a new best
//   2. LR schedule  — multiply the learning rate by `factor` when
//                     val_loss has not improved for `patience` epochs
//   3. Early stop   — stop when val_IoU has not improved for
//                     `patience` epochs
//
// All three share the same notion of "improved", captured by
// Monitor: a best-so-far value, a direction (min or max) and a
// minimum change that counts as progress. A NaN metric is never
// an improvement.
//
// These are plain state machines with no tensor code, so they
// are unit-tested directly.
//
// Reference: Prechelt (1998) Early Stopping — But When?

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Lower is better (losses)
    Min,
    /// Higher is better (IoU, accuracy)
    Max,
}

/// Tracks the best value of one metric.
#[derive(Debug, Clone)]
pub struct Monitor {
    mode:      Mode,
    min_delta: f64,
    best:      Option<f64>,
}

impl Monitor {
    pub fn new(mode: Mode, min_delta: f64) -> Self {
        Self { mode, min_delta: min_delta.abs(), best: None }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Would `value` count as an improvement over the best so far?
    pub fn is_improvement(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        match (self.best, self.mode) {
            (None, _)          => true,
            (Some(b), Mode::Min) => value < b - self.min_delta,
            (Some(b), Mode::Max) => value > b + self.min_delta,
        }
    }

    /// Record `value`; returns true (and stores it as best) if it improved.
    pub fn update(&mut self, value: f64) -> bool {
        let improved = self.is_improvement(value);
        if improved {
            self.best = Some(value);
        }
        improved
    }
}

// ─── EarlyStopping ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor:  Monitor,
    patience: usize,
    wait:     usize,
}

impl EarlyStopping {
    pub fn new(mode: Mode, patience: usize, min_delta: f64) -> Self {
        Self { monitor: Monitor::new(mode, min_delta), patience, wait: 0 }
    }

    /// Feed one epoch's metric. Returns true if it improved.
    pub fn update(&mut self, value: f64) -> bool {
        if self.monitor.update(value) {
            self.wait = 0;
            true
        } else {
            self.wait += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.wait >= self.patience
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.wait
    }

    pub fn best(&self) -> Option<f64> {
        self.monitor.best()
    }
}

// ─── ReduceLrOnPlateau ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    monitor:  Monitor,
    factor:   f64,
    patience: usize,
    cooldown: usize,
    min_lr:   f64,
    wait:             usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(mode: Mode, factor: f64, patience: usize, min_delta: f64) -> Self {
        Self {
            monitor: Monitor::new(mode, min_delta),
            factor,
            patience,
            cooldown: 0,
            min_lr: 0.0,
            wait: 0,
            cooldown_counter: 0,
        }
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    fn in_cooldown(&self) -> bool {
        self.cooldown_counter > 0
    }

    /// Feed one epoch's metric and the current learning rate;
    /// returns the learning rate to use for the next epoch.
    pub fn step(&mut self, value: f64, lr: f64) -> f64 {
        if self.in_cooldown() {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        if self.monitor.update(value) {
            self.wait = 0;
            return lr;
        }
        // Checked after the decrement: the last cooldown epoch already counts.
        if self.in_cooldown() {
            return lr;
        }

        self.wait += 1;
        if self.wait < self.patience || lr <= self.min_lr {
            return lr;
        }

        self.wait = 0;
        self.cooldown_counter = self.cooldown;
        (lr * self.factor).max(self.min_lr)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_is_always_an_improvement() {
        let mut m = Monitor::new(Mode::Max, 0.0);
        assert!(m.update(0.0));
        assert_eq!(m.best(), Some(0.0));
    }

    #[test]
    fn test_min_delta_filters_tiny_gains() {
        let mut m = Monitor::new(Mode::Min, 0.001);
        m.update(1.0);
        assert!(!m.is_improvement(0.9995));
        assert!(m.is_improvement(0.998));
    }

    #[test]
    fn test_nan_never_improves() {
        let mut m = Monitor::new(Mode::Max, 0.0);
        assert!(!m.update(f64::NAN));
        assert_eq!(m.best(), None);
    }

    #[test]
    fn test_early_stopping_after_patience() {
        let mut es = EarlyStopping::new(Mode::Max, 3, 0.0);
        es.update(0.5);
        es.update(0.6);
        for _ in 0..2 {
            es.update(0.55);
            assert!(!es.should_stop());
        }
        es.update(0.6); // equal is not better
        assert!(es.should_stop());
        assert_eq!(es.best(), Some(0.6));
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut es = EarlyStopping::new(Mode::Max, 2, 0.0);
        es.update(0.1);
        es.update(0.05);
        assert_eq!(es.epochs_without_improvement(), 1);
        es.update(0.2);
        assert_eq!(es.epochs_without_improvement(), 0);
    }

    #[test]
    fn test_plateau_reduces_after_patience() {
        let mut p = ReduceLrOnPlateau::new(Mode::Min, 0.7, 2, 0.001);
        let mut lr = 1.0;
        lr = p.step(1.0, lr);
        lr = p.step(1.0, lr);
        assert_eq!(lr, 1.0);
        lr = p.step(1.0, lr);
        assert!((lr - 0.7).abs() < 1e-12);
        // counter restarts after a reduction
        lr = p.step(1.0, lr);
        assert!((lr - 0.7).abs() < 1e-12);
        lr = p.step(1.0, lr);
        assert!((lr - 0.49).abs() < 1e-12);
    }

    #[test]
    fn test_plateau_improvement_keeps_lr() {
        let mut p = ReduceLrOnPlateau::new(Mode::Min, 0.5, 1, 0.0);
        let mut lr = 0.1;
        for v in [1.0, 0.9, 0.8, 0.7] {
            lr = p.step(v, lr);
        }
        assert_eq!(lr, 0.1);
    }

    #[test]
    fn test_plateau_respects_min_lr_and_cooldown() {
        let mut p = ReduceLrOnPlateau::new(Mode::Min, 0.1, 1, 0.0)
            .with_min_lr(0.05)
            .with_cooldown(2);
        let mut lr = 1.0;
        lr = p.step(1.0, lr);
        lr = p.step(1.0, lr);
        assert!((lr - 0.1).abs() < 1e-12);
        // one cooldown epoch: no change
        lr = p.step(1.0, lr);
        assert!((lr - 0.1).abs() < 1e-12);
        lr = p.step(1.0, lr);
        assert!((lr - 0.05).abs() < 1e-12);
        lr = p.step(1.0, lr);
        assert!((lr - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_plateau_cooldown_of_one_does_not_delay() {
        let mut lrs = Vec::new();
        for cooldown in [0, 1] {
            let mut p = ReduceLrOnPlateau::new(Mode::Min, 0.5, 1, 0.0).with_cooldown(cooldown);
            let mut lr = 1.0;
            let seq: Vec<f64> = (0..4).map(|_| { lr = p.step(1.0, lr); lr }).collect();
            lrs.push(seq);
        }
        assert_eq!(lrs[0], vec![1.0, 0.5, 0.25, 0.125]);
        assert_eq!(lrs[0], lrs[1]);
    }

    #[test]
    fn test_plateau_wait_restarts_after_cooldown() {
        let mut p = ReduceLrOnPlateau::new(Mode::Min, 0.5, 2, 0.0).with_cooldown(2);
        let mut lr = 1.0;
        let seq: Vec<f64> = (0..7).map(|_| { lr = p.step(1.0, lr); lr }).collect();
        // reduce at 3, cooldown 4, wait 5, reduce 6
        assert_eq!(seq, vec![1.0, 1.0, 0.5, 0.5, 0.5, 0.25, 0.25]);
    }
}
