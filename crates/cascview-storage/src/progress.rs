//! Load progress reporting
//!
//! Opening storage runs on the caller's thread. A [`Progress`] observer
//! receives percent-complete notifications and may live on another thread.

/// Phase of the storage open sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Build info and config files
    Config,
    /// Local `.idx` and CDN `.index` files
    Indices,
    /// Encoding table
    Encoding,
    /// Root table
    Root,
    /// Install and download manifests
    Manifests,
    /// Name tree
    Tree,
}

impl LoadPhase {
    /// Overall percentage at the start of the phase
    pub const fn start_percent(self) -> u8 {
        match self {
            Self::Config => 0,
            Self::Indices => 5,
            Self::Encoding => 30,
            Self::Root => 55,
            Self::Manifests => 80,
            Self::Tree => 95,
        }
    }

    /// Label shown to observers
    pub const fn label(self) -> &'static str {
        match self {
            Self::Config => "Loading configuration",
            Self::Indices => "Loading indices",
            Self::Encoding => "Loading encoding table",
            Self::Root => "Loading root table",
            Self::Manifests => "Loading manifests",
            Self::Tree => "Building tree",
        }
    }
}

/// Observer of load progress
pub trait Progress {
    /// Called with overall percent complete and an optional status label
    fn report(&self, percent: u8, status: Option<&str>);

    /// Called when a phase starts
    fn phase(&self, phase: LoadPhase) {
        self.report(phase.start_percent(), Some(phase.label()));
    }
}

impl<F: Fn(u8, Option<&str>)> Progress for F {
    fn report(&self, percent: u8, status: Option<&str>) {
        self(percent, status);
    }
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _percent: u8, _status: Option<&str>) {}
}
