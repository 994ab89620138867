//! `{{name}}` placeholder substitution.

use crate::registry::{ArgMap, ArgValue};

/// Replace every `{{key}}` in `script` with the value of `key`.
///
/// Strings end up inside exactly one pair of double quotes: a placeholder the
/// template already quotes (`"{{key}}"`) takes the bare text, any other gets
/// the quotes added. Numbers and booleans are inserted as literal text.
/// Quotes inside a string value are not escaped. Placeholders without a
/// matching argument are left as they are.
pub fn substitute(script: &str, args: &ArgMap) -> String {
    let mut text = script.to_string();
    for (key, value) in args {
        let placeholder = format!("{{{{{key}}}}}");
        if !text.contains(&placeholder) {
            continue;
        }
        text = match value {
            ArgValue::String(s) => {
                let quoted = format!("\"{s}\"");
                text.replace(&format!("\"{placeholder}\""), &quoted)
                    .replace(&placeholder, &quoted)
            }
            other => text.replace(&placeholder, &other.to_string()),
        };
    }
    text
}
