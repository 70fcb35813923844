//! Waiting for downstream tiers to catch up with a commit

use cfgctl_core::{log_op_end, log_op_error, log_op_start, CtlError, Result, WaitType};
use cfgctl_core_types::schema::OP_CONVERGE;
use cfgctl_store::{Connection, Snapshot};
use std::time::Instant;

/// Current value of the counter `kind` waits on
///
/// Fleet convergence implies distribution, so it is the lower of the two
/// counters.
pub fn observed_generation(snapshot: &Snapshot, kind: WaitType) -> Option<i64> {
    let generation = &snapshot.schema().generation;
    let dist = snapshot.singleton_integer(&generation.table, &generation.dist);
    match kind {
        WaitType::None => None,
        WaitType::Dist => dist,
        WaitType::Fleet => {
            let fleet = snapshot.singleton_integer(&generation.table, &generation.fleet);
            dist.zip(fleet).map(|(d, f)| d.min(f))
        }
    }
}

/// Block until the counter selected by `kind` reaches `next_cfg`
///
/// # Errors
///
/// The deadline passes first, or the connection dies.
pub fn wait_for_convergence(
    conn: &mut dyn Connection,
    kind: WaitType,
    next_cfg: i64,
    deadline: Option<Instant>,
) -> Result<()> {
    let started = Instant::now();
    log_op_start!(OP_CONVERGE, next_cfg = next_cfg, wait = kind.as_str());

    loop {
        conn.run();
        if !conn.is_alive() {
            let err = CtlError::ConnectionFailed {
                target: conn.target().to_string(),
                reason: conn.last_error().unwrap_or_else(|| "connection lost".to_string()),
            };
            log_op_error!(OP_CONVERGE, err.clone(), duration_ms = started.elapsed().as_millis() as u64);
            return Err(err.into());
        }

        let observed = observed_generation(&conn.snapshot(), kind);
        if observed.is_some_and(|cfg| cfg >= next_cfg) {
            log_op_end!(OP_CONVERGE, duration_ms = started.elapsed().as_millis() as u64);
            return Ok(());
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            log_op_error!(
                OP_CONVERGE,
                CtlError::TimeoutExpired,
                duration_ms = started.elapsed().as_millis() as u64,
                observed = ?observed
            );
            return Err(CtlError::TimeoutExpired.into());
        }
        conn.wait(deadline);
    }
}
