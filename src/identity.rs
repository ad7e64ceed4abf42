use anyhow::{Result, anyhow};
use tracing::info;

use crate::git::Git;

// Defaults mirror the GitHub Actions bot identity.
pub const DEFAULT_COMMITTER: &str = "GitHub <noreply@github.com>";
pub const DEFAULT_AUTHOR: &str =
    "github-actions[bot] <41898282+github-actions[bot]@users.noreply.github.com>";

/// Parse a `Display Name <email@address.com>` string into its halves.
/// Both halves are trimmed and must be non-empty; the closing `>` must end
/// the string.
pub fn parse_display_name_email(value: &str) -> Result<(String, String)> {
    let invalid = || {
        anyhow!("The format of '{value}' is not a valid email address with display name")
    };
    let open = value.find('<').ok_or_else(invalid)?;
    let rest = &value[open + 1..];
    let close = rest.find('>').ok_or_else(invalid)?;
    if close != rest.len() - 1 {
        return Err(invalid());
    }
    let name = value[..open].trim();
    let email = rest[..close].trim();
    if name.is_empty() || email.is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), email.to_string()))
}

/// Decide the committer and author for this run and inject them into the
/// git subprocess environment.
///
/// If only one of the two is supplied it is used for both roles. If neither
/// is supplied and the repository config already carries a complete
/// identity, the existing config is left untouched. Otherwise the bot
/// defaults apply.
pub fn configure(git: &mut Git, committer: Option<&str>, author: Option<&str>) -> Result<()> {
    let (committer, author) = match (committer, author) {
        (Some(committer), Some(author)) => (committer.to_string(), author.to_string()),
        (None, Some(author)) => {
            println!("Supplied author will also be used as the committer.");
            (author.to_string(), author.to_string())
        }
        (Some(committer), None) => {
            println!("Supplied committer will also be used as the author.");
            (committer.to_string(), committer.to_string())
        }
        (None, None) => {
            if user_config_is_set(git)? {
                return Ok(());
            }
            (DEFAULT_COMMITTER.to_string(), DEFAULT_AUTHOR.to_string())
        }
    };

    let (committer_name, committer_email) = parse_display_name_email(&committer)?;
    let (author_name, author_email) = parse_display_name_email(&author)?;
    git.set_env("GIT_COMMITTER_NAME", &committer_name);
    git.set_env("GIT_COMMITTER_EMAIL", &committer_email);
    git.set_env("GIT_AUTHOR_NAME", &author_name);
    git.set_env("GIT_AUTHOR_EMAIL", &author_email);
    info!(
        committer = %committer_name,
        author = %author_name,
        "identity:injected into git environment"
    );
    println!("Configured git committer as '{committer_name} <{committer_email}>'");
    println!("Configured git author as '{author_name} <{author_email}>'");
    Ok(())
}

/// Whether the repository config already carries a complete identity,
/// either as `user.*` or as all four `committer.*`/`author.*` values.
fn user_config_is_set(git: &Git) -> Result<bool> {
    let name = git.config_get("user.name")?;
    let email = git.config_get("user.email")?;
    if let (Some(name), Some(email)) = (name, email) {
        println!("Git user already configured as '{name} <{email}>'");
        return Ok(true);
    }

    let committer_name = git.config_get("committer.name")?;
    let committer_email = git.config_get("committer.email")?;
    let author_name = git.config_get("author.name")?;
    let author_email = git.config_get("author.email")?;
    if let (Some(committer_name), Some(committer_email), Some(author_name), Some(author_email)) =
        (committer_name, committer_email, author_name, author_email)
    {
        println!("Git committer already configured as '{committer_name} <{committer_email}>'");
        println!("Git author already configured as '{author_name} <{author_email}>'");
        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_email() {
        let (name, email) = parse_display_name_email("abc def <abc@def.com>").unwrap();
        assert_eq!(name, "abc def");
        assert_eq!(email, "abc@def.com");
    }

    #[test]
    fn test_parse_without_space_before_bracket() {
        let (name, email) = parse_display_name_email("abc def<abc@def.com>").unwrap();
        assert_eq!(name, "abc def");
        assert_eq!(email, "abc@def.com");
    }

    #[test]
    fn test_parse_rejects_plain_email() {
        assert!(parse_display_name_email("abc@def.com").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        assert!(parse_display_name_email("<abc@def.com>").is_err());
        assert!(parse_display_name_email("   <abc@def.com>").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_email() {
        assert!(parse_display_name_email("abc def <>").is_err());
        assert!(parse_display_name_email("abc def <   >").is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_garbage() {
        assert!(parse_display_name_email("abc def <abc@def.com> extra").is_err());
    }

    #[test]
    fn test_parse_round_trip() {
        for (name, email) in [
            ("GitHub", "noreply@github.com"),
            ("a b c", "x@y.z"),
            (
                "github-actions[bot]",
                "41898282+github-actions[bot]@users.noreply.github.com",
            ),
        ] {
            let formatted = format!("{name} <{email}>");
            assert_eq!(
                parse_display_name_email(&formatted).unwrap(),
                (name.to_string(), email.to_string())
            );
        }
    }

    #[test]
    fn test_defaults_parse() {
        assert!(parse_display_name_email(DEFAULT_COMMITTER).is_ok());
        assert!(parse_display_name_email(DEFAULT_AUTHOR).is_ok());
    }
}
