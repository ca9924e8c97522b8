//! Terminal formatting for CLI output.
//!
//! Colors, symbols and tables are kept here so every command renders the
//! same way.

mod headers;
mod output;
mod progress;
mod status;
mod tables;

pub use headers::{print_section_header, SectionStyle};
pub use output::{format_duration, print_key_value, print_separator_with_spacing, print_summary_box};
pub use progress::create_progress_bar;
pub use status::{print_error, print_success, print_verdict, print_warning};
pub use tables::{print_link_table, print_summary_table, print_workspace_list, print_workspace_table};
