//! Paths command handler.

use gemi_core::candidate_paths;

use crate::bootstrap::CliContext;

/// Print every location searched for the backend, in search order.
pub fn execute(ctx: &CliContext) {
    for (index, path) in candidate_paths(&ctx.settings).iter().enumerate() {
        let marker = if path.is_file() { "found" } else { "-" };
        println!("{:>2}. {} [{marker}]", index + 1, path.display());
    }
    println!("    then $PATH");
}
