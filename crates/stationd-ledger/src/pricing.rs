//! A static, illustrative hourly rate table (spec §4.D treats actual
//! provider pricing as out of scope; the ledger only needs *a* monotonic
//! rate per size to exercise accrual and budget gating).

use stationd_core::domain::Size;

/// On-demand hourly rate in the ledger's nominal currency unit.
pub fn hourly_rate(size: &Size) -> f64 {
    match size {
        Size::S => 0.10,
        Size::M => 0.25,
        Size::L => 0.60,
        Size::Xl => 1.20,
        Size::Explicit(_) => 0.40,
    }
}
