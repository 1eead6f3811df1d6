//! Exit codes shared by every subcommand.
//! CI treats 1 as "the eval said no" and 2 as "the harness broke".

pub const SUCCESS: i32 = 0;
/// Case failures or regression-gate failures.
pub const CHECK_FAILED: i32 = 1;
/// Setup, I/O, adapter configuration, or refused baseline update.
pub const OPERATIONAL_ERROR: i32 = 2;
