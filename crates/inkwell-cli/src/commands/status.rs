use crate::commands::common::{format_status_lines, Session};
use crate::error::CliError;

pub fn run_status(session: &Session, as_json: bool) -> Result<(), CliError> {
    let state = session.controller.state();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        for line in format_status_lines(&state) {
            println!("{line}");
        }
    }
    Ok(())
}
