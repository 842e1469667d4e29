use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "display this text.")]
    Help,
    #[command(description = "say hello.")]
    SayHi,
    #[command(description = "show network transfer of the VPS this month.")]
    Usage,
    #[command(description = "show current weather, e.g. /weather shenzhen")]
    Weather,
}

/// Splits `/name rest of text` into `("name", "rest of text")`.
///
/// The first character is assumed to be the command marker and is dropped
/// without being checked.
pub fn parse_command(text: &str) -> (&str, &str) {
    let mut chars = text.chars();
    chars.next();
    let rest = chars.as_str();

    rest.split_once(' ').unwrap_or((rest, ""))
}
