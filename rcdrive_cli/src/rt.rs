//! Real-time scheduling for the control loop (Linux SCHED_FIFO, affinity, mlockall).

use crate::cli::RtLock;

/// What `--rt` asked for.
#[derive(Debug, Clone, Copy)]
pub struct RtRequest {
    pub enabled: bool,
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(target_os = "linux")]
mod linux {
    use super::RtLock;

    /// Capacity of cpu_set_t in CPU indices (bits).
    const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;
    const CAP_SYS_NICE: u64 = 1 << 23;

    fn mlockall(flags: libc::c_int) -> std::io::Result<()> {
        // SAFETY: mlockall takes no pointers.
        let rc = unsafe { libc::mlockall(flags) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    fn memlock_limit() -> Option<String> {
        let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
        // SAFETY: getrlimit writes a full rlimit on success.
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        // SAFETY: rc == 0 above.
        let cur = unsafe { rlim.assume_init() }.rlim_cur;
        Some(if cur == libc::RLIM_INFINITY {
            "memlock limit: unlimited".to_string()
        } else {
            format!("memlock limit: {} KiB", cur / 1024)
        })
    }

    fn retryable(err: &std::io::Error) -> bool {
        matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
    }

    pub(super) fn lock_memory(lock: RtLock) -> eyre::Result<()> {
        let err = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => match mlockall(libc::MCL_CURRENT) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            },
            RtLock::All => match mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) {
                Ok(()) => return Ok(()),
                // Fall back to resident pages only when the limit is the problem.
                Err(e) if retryable(&e) => match mlockall(libc::MCL_CURRENT) {
                    Ok(()) => {
                        tracing::warn!(error = %e, "mlockall(current|future) failed; locked current pages only");
                        return Ok(());
                    }
                    Err(_) => e,
                },
                Err(e) => e,
            },
        };
        let mut msg = format!("mlockall failed: {err}");
        if retryable(&err) {
            if let Some(limit) = memlock_limit() {
                msg.push_str(&format!("; {limit}"));
            }
            msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        }
        Err(eyre::eyre!(msg))
    }

    fn has_sys_nice() -> bool {
        let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
            // Can't tell; let sched_setscheduler decide.
            return true;
        };
        let cap = status.lines().any(|line| {
            line.strip_prefix("CapEff:")
                .and_then(|rest| u64::from_str_radix(rest.trim(), 16).ok())
                .is_some_and(|caps| caps & CAP_SYS_NICE != 0)
        });
        // SAFETY: geteuid has no preconditions.
        cap || unsafe { libc::geteuid() } == 0
    }

    pub(super) fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
        if !has_sys_nice() {
            eyre::bail!(
                "insufficient privileges for SCHED_FIFO: needs CAP_SYS_NICE or root. \
                 Hint: 'sudo setcap cap_sys_nice=ep /path/to/rcdrive'"
            );
        }
        // SAFETY: plain queries with a valid policy constant.
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(libc::SCHED_FIFO),
                libc::sched_get_priority_max(libc::SCHED_FIFO),
            )
        };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let prio = prio.unwrap_or(max).clamp(min, max);
        let param = libc::sched_param {
            sched_priority: prio,
        };
        // SAFETY: param outlives the call; pid 0 is the calling thread.
        let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
        if rc != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(prio)
    }

    pub(super) fn pin_cpu(cpu: Option<usize>) -> eyre::Result<usize> {
        let target = cpu.unwrap_or(0);
        if target >= MAX_CPUSET_BITS {
            eyre::bail!("requested CPU {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set.
        let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        let size = std::mem::size_of::<libc::cpu_set_t>();
        // SAFETY: `allowed` is a valid cpu_set_t of `size` bytes.
        if unsafe { libc::sched_getaffinity(0, size, &mut allowed) } != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        // SAFETY: target < MAX_CPUSET_BITS checked above.
        if !unsafe { libc::CPU_ISSET(target, &allowed) } {
            eyre::bail!("CPU {target} not permitted by current affinity mask");
        }
        // SAFETY: as above.
        let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe {
            libc::CPU_ZERO(&mut desired);
            libc::CPU_SET(target, &mut desired);
        }
        // SAFETY: `desired` is a valid cpu_set_t of `size` bytes.
        if unsafe { libc::sched_setaffinity(0, size, &desired) } != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(target)
    }
}

/// Apply real-time settings once per process. Failures are logged, never fatal.
#[cfg(target_os = "linux")]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !req.enabled {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match linux::lock_memory(req.lock) {
            Ok(()) => tracing::info!(lock = ?req.lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt: memory lock not applied"),
        }
        match linux::fifo_priority(req.prio) {
            Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO enabled"),
            Err(e) => tracing::warn!(error = %e, "rt: SCHED_FIFO not applied"),
        }
        match linux::pin_cpu(req.cpu) {
            Ok(cpu) => tracing::info!(cpu, "rt: pinned"),
            Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    if req.enabled {
        tracing::warn!("rt: real-time mode is only supported on Linux; ignoring --rt");
    }
}
