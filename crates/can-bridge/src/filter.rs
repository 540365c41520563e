//! Receive-side frame filtering

use std::fmt;

use crate::frame::CanFrame;

/// User-supplied acceptance test
pub type FramePredicate = Box<dyn Fn(&CanFrame) -> bool + Send>;

/// Exactly one policy is active at a time
pub enum FilterPolicy {
    AcceptAll,
    Whitelist(Vec<u32>),
    Blacklist(Vec<u32>),
    /// Inclusive identifier range
    Range { start: u32, end: u32 },
    Predicate(FramePredicate),
}

impl fmt::Debug for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPolicy::AcceptAll => write!(f, "AcceptAll"),
            FilterPolicy::Whitelist(ids) => write!(f, "Whitelist({} ids)", ids.len()),
            FilterPolicy::Blacklist(ids) => write!(f, "Blacklist({} ids)", ids.len()),
            FilterPolicy::Range { start, end } => write!(f, "Range({:#X}..={:#X})", start, end),
            FilterPolicy::Predicate(_) => write!(f, "Predicate"),
        }
    }
}

/// Acceptance filter applied to every frame read from the controller
///
/// A disabled filter passes everything regardless of policy.
#[derive(Debug)]
pub struct CanFilter {
    policy: FilterPolicy,
    enabled: bool,
}

impl CanFilter {
    pub fn accept_all() -> Self {
        Self::with_policy(FilterPolicy::AcceptAll)
    }

    pub fn whitelist(ids: impl Into<Vec<u32>>) -> Self {
        Self::with_policy(FilterPolicy::Whitelist(ids.into()))
    }

    pub fn blacklist(ids: impl Into<Vec<u32>>) -> Self {
        Self::with_policy(FilterPolicy::Blacklist(ids.into()))
    }

    pub fn range(start: u32, end: u32) -> Self {
        Self::with_policy(FilterPolicy::Range { start, end })
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&CanFrame) -> bool + Send + 'static,
    {
        Self::with_policy(FilterPolicy::Predicate(Box::new(f)))
    }

    fn with_policy(policy: FilterPolicy) -> Self {
        Self {
            policy,
            enabled: true,
        }
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether `frame` passes this filter
    pub fn accepts(&self, frame: &CanFrame) -> bool {
        if !self.enabled {
            return true;
        }
        let id = frame.id();
        match &self.policy {
            FilterPolicy::AcceptAll => true,
            FilterPolicy::Whitelist(ids) => ids.contains(&id),
            FilterPolicy::Blacklist(ids) => !ids.contains(&id),
            FilterPolicy::Range { start, end } => (*start..=*end).contains(&id),
            FilterPolicy::Predicate(f) => f(frame),
        }
    }
}

impl Default for CanFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}
