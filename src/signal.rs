use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Caller-owned "busy" signal. While set, no ticks are processed but all
/// controller state is kept.
#[derive(Debug, Clone, Default)]
pub struct CapturingFlag(Arc<AtomicBool>);

impl CapturingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, capturing: bool) {
        self.0.store(capturing, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stops a run loop before its next tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CapturingFlag::new();
        let other = flag.clone();
        other.set(true);
        assert!(flag.is_set());
        other.set(false);
        assert!(!flag.is_set());

        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
