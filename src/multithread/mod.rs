//! Cross-thread operation monitoring
//!
//! Operations and sequences are driven from a single thread. The work behind
//! them, however, may well run elsewhere, and so may whoever watches it. This
//! submodule provides ways to observe operations from other threads.
//!
//! For now, only polling is proposed. It suits clients which periodically
//! check on the progress of some work and do not need to synchronize with it,
//! such as a UI refreshing a progress bar.

pub mod polling;
