//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "rcdrive", version, about = "RC car drive controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/rcdrive.toml")]
    pub config: PathBuf,

    /// Optional motor-model CSV (strict header); overrides [motor_model]
    #[arg(long = "motor-model", value_name = "FILE")]
    pub motor_model: Option<PathBuf>,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Gearbox position selectable from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum GearArg {
    Low,
    High,
}

impl From<GearArg> for rcdrive_config::Gear {
    fn from(g: GearArg) -> Self {
        match g {
            GearArg::Low => rcdrive_config::Gear::Low,
            GearArg::High => rcdrive_config::Gear::High,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DriveArgs {
    /// Commanded speed in percent of the available maximum (-100..=100)
    #[arg(long, allow_negative_numbers = true)]
    pub speed: f32,
    /// Run length in ms (capped by runner.max_run_ms)
    #[arg(long, value_name = "MS")]
    pub duration_ms: Option<u64>,
    /// Speed-limit factor, 0 < f <= 1
    #[arg(long, value_name = "F")]
    pub limit: Option<f32>,
    /// Control mode: 0 FF, 1 FF+P, 2 FF+PI, 3 PI
    #[arg(long, value_name = "MODE")]
    pub mode: Option<u8>,
    /// Gear to drive in; defaults to gearbox.initial
    #[arg(long, value_enum)]
    pub gear: Option<GearArg>,
    /// Distance to the simulated obstacle at start, mm (overrides sim.obstacle_mm)
    #[arg(long, value_name = "MM")]
    pub obstacle_mm: Option<u32>,
    /// Run without emergency braking even if [aeb] is enabled
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_aeb: bool,
    /// Jam the simulated shaft after this many ms to exercise stall recovery
    #[arg(long, value_name = "MS")]
    pub jam_after_ms: Option<u64>,
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority, pins to one CPU, and calls mlockall to lock the process address space into RAM. This keeps the control tick free of page faults and scheduler jitter but may require elevated privileges or ulimits (e.g., memlock).\n\nOther OSes: ignored with a warning."
    )]
    pub rt: bool,
    /// Real-time priority for SCHED_FIFO on Linux (1..=max)
    #[arg(
        long,
        value_name = "PRIO",
        long_help = "SCHED_FIFO priority when --rt is enabled (Linux only). Higher values run before lower ones. Range is platform-defined (usually 1..=99)."
    )]
    pub rt_prio: Option<i32>,
    /// Select memory locking mode for --rt: none, current, or all
    #[arg(
        long,
        value_enum,
        value_name = "MODE",
        long_help = "Select memory locking mode when --rt is enabled.\n- none: do not lock memory.\n- current: lock currently resident pages (mlockall(MCL_CURRENT)).\n- all: lock current and future pages (mlockall(MCL_CURRENT|MCL_FUTURE)).\nDefault: current on Linux."
    )]
    pub rt_lock: Option<RtLock>,
    /// Real-time CPU index to pin the process to (Linux only). Defaults to 0.
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
    /// Print control loop timing stats
    #[arg(long, action = ArgAction::SetTrue)]
    pub stats: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the closed speed loop for a while, then stop
    Drive(DriveArgs),
    /// Print the emergency-braking speed ceiling for an obstacle distance
    Aeb {
        /// Distance to the obstacle, mm
        #[arg(long, value_name = "MM")]
        distance_mm: u32,
        /// Gear to evaluate; defaults to gearbox.initial
        #[arg(long, value_enum)]
        gear: Option<GearArg>,
    },
    /// Build the motor from config and hold zero speed briefly
    SelfCheck,
}
