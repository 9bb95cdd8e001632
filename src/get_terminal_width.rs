use terminal_size::{Width, terminal_size};

/// The width to use for `--help` output: the terminal width minus
/// `margin`, or 120 if not on a terminal.
pub fn get_terminal_width(margin: usize) -> usize {
    if let Some((Width(width), _)) = terminal_size() {
        usize::from(width).saturating_sub(margin).max(40)
    } else {
        120
    }
}
