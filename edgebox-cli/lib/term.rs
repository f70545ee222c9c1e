//! Terminal markers for user-facing output.

use std::sync::LazyLock;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// A green checkmark.
pub static CHECKMARK: LazyLock<String> =
    LazyLock::new(|| console::style("✓").green().bold().to_string());

/// A red cross.
pub static CROSSMARK: LazyLock<String> =
    LazyLock::new(|| console::style("✗").red().bold().to_string());
