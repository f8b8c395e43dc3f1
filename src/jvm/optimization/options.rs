use serde::{Deserialize, Serialize};

/// Which optimizations to run while translating a class.
///
/// `PRETTY` keeps the output close to what a Java compiler would produce and
/// is the default. `ALL` additionally trades readability for size and is
/// what a class is retried with once it hits a class file limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationOptions
{
    pub inline_consts: bool,
    pub prune_store_loads: bool,
    pub copy_propagation: bool,
    pub remove_unused_regs: bool,
    pub dup2ize: bool,
    pub sort_registers: bool,
    pub split_pool: bool,
    pub delay_consts: bool,
}

impl OptimizationOptions
{
    pub const NONE: OptimizationOptions = OptimizationOptions {
        inline_consts: false,
        prune_store_loads: false,
        copy_propagation: false,
        remove_unused_regs: false,
        dup2ize: false,
        sort_registers: false,
        split_pool: false,
        delay_consts: false,
    };

    pub const PRETTY: OptimizationOptions = OptimizationOptions {
        inline_consts: true,
        prune_store_loads: true,
        copy_propagation: true,
        remove_unused_regs: true,
        ..OptimizationOptions::NONE
    };

    pub const ALL: OptimizationOptions = OptimizationOptions {
        inline_consts: true,
        prune_store_loads: true,
        copy_propagation: true,
        remove_unused_regs: true,
        dup2ize: true,
        sort_registers: true,
        split_pool: true,
        delay_consts: true,
    };

    pub fn is_all(&self) -> bool
    {
        *self == OptimizationOptions::ALL
    }
}

impl Default for OptimizationOptions
{
    fn default() -> Self
    {
        OptimizationOptions::PRETTY
    }
}
