//! Debug logging utilities for dosvm.
//!
//! Set the `DOSVM_DEBUG` environment variable to enable verbose logging:
//! - `DOSVM_DEBUG=1` - Enable all debug output
//! - `DOSVM_DEBUG=dispatch` - Enable only interrupt-dispatch logs
//! - `DOSVM_DEBUG=regs` - Enable only register-access logs
//! - `DOSVM_DEBUG=dispatch,regs` - Enable multiple categories

use std::sync::OnceLock;

/// Debug categories that can be enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCategory {
    Dispatch,
    Regs,
    All,
}

/// Cached debug configuration
static DEBUG_CONFIG: OnceLock<DebugConfig> = OnceLock::new();

#[derive(Debug, Default)]
struct DebugConfig {
    enabled: bool,
    dispatch: bool,
    regs: bool,
}

impl DebugConfig {
    fn from_env() -> Self {
        match std::env::var("DOSVM_DEBUG") {
            Ok(val) if val == "1" || val.to_lowercase() == "all" => Self {
                enabled: true,
                dispatch: true,
                regs: true,
            },
            Ok(val) => {
                let val_lower = val.to_lowercase();
                Self {
                    enabled: true,
                    dispatch: val_lower.contains("dispatch"),
                    regs: val_lower.contains("regs"),
                }
            }
            Err(_) => Self::default(),
        }
    }
}

fn get_config() -> &'static DebugConfig {
    DEBUG_CONFIG.get_or_init(DebugConfig::from_env)
}

/// Check if debug logging is enabled for a category
pub fn is_debug_enabled(category: DebugCategory) -> bool {
    let config = get_config();
    if !config.enabled {
        return false;
    }
    match category {
        DebugCategory::All => config.dispatch || config.regs,
        DebugCategory::Dispatch => config.dispatch,
        DebugCategory::Regs => config.regs,
    }
}

/// Debug print macro for interrupt-dispatch logs
#[macro_export]
macro_rules! debug_dispatch {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Dispatch) {
            eprintln!($($arg)*);
        }
    };
}

/// Debug print macro for register-access logs
#[macro_export]
macro_rules! debug_regs {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Regs) {
            eprintln!($($arg)*);
        }
    };
}
