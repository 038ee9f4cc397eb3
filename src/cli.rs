use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::entities::{BookingId, GroupId, PropertyChoice, PropertyId};

const VERSION_INFO: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "HTTP:   ureq 2 (blocking, rustls)"
);

/// Shared booking calendar for groups of properties
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Backend base URL (overrides staycal.json and STAYCAL_API_URL)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Enable debug logging to file (default: staycal.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in and remember the session
    Login { username: String, password: String },
    /// Create an account
    Register { username: String, password: String },
    /// Forget the saved session
    Logout,
    /// Show groups, properties and the calendar for a selection
    Show {
        /// Group id (default: first group)
        #[arg(short = 'g', long = "group")]
        group: Option<GroupId>,
        /// Property id, or "all" for every property of the group
        #[arg(short = 'p', long = "property", value_parser = parse_choice)]
        property: Option<PropertyChoice>,
    },
    /// Create a group
    CreateGroup { name: String },
    /// Join a group with an invite code
    Join { code: String },
    /// Add a property to a group
    AddProperty {
        name: String,
        #[arg(short = 'g', long = "group")]
        group: Option<GroupId>,
    },
    /// Set or reset a property's color
    Color {
        property: PropertyId,
        /// CSS color, e.g. "#2563eb"
        #[arg(required_unless_present = "reset")]
        color: Option<String>,
        /// Go back to the derived color
        #[arg(long = "reset", conflicts_with = "color")]
        reset: bool,
        #[arg(short = 'g', long = "group")]
        group: Option<GroupId>,
    },
    /// Book a property
    Book {
        property: PropertyId,
        guest: String,
        start: NaiveDate,
        end: NaiveDate,
        #[arg(short = 'g', long = "group")]
        group: Option<GroupId>,
    },
    /// Change a booking
    UpdateBooking {
        booking: BookingId,
        guest: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Delete a booking
    DeleteBooking { booking: BookingId },
    /// Generate an invite code for a group
    InviteCode {
        #[arg(short = 'g', long = "group")]
        group: Option<GroupId>,
    },
}

fn parse_choice(s: &str) -> Result<PropertyChoice, String> {
    match s.trim() {
        "" => Err("property id must not be empty".to_string()),
        "all" | "ALL" => Ok(PropertyChoice::All),
        id => Ok(PropertyChoice::One(id.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_show() {
        let args = Args::try_parse_from(["staycal", "-vv", "show", "-g", "12", "-p", "all"]).unwrap();
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Show { group, property } => {
                assert_eq!(group, Some("12".into()));
                assert_eq!(property, Some(PropertyChoice::All));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_book_dates() {
        let args =
            Args::try_parse_from(["staycal", "book", "p1", "Alice", "2024-06-01", "2024-06-03"]).unwrap();
        let Command::Book { start, end, .. } = args.command else {
            panic!("expected book");
        };
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert!(Args::try_parse_from(["staycal", "book", "p1", "Alice", "June 1", "2024-06-03"]).is_err());
    }

    #[test]
    fn test_color_needs_value_or_reset() {
        assert!(Args::try_parse_from(["staycal", "color", "p1"]).is_err());
        assert!(Args::try_parse_from(["staycal", "color", "p1", "--reset"]).is_ok());
        assert!(Args::try_parse_from(["staycal", "color", "p1", "#fff", "--reset"]).is_err());
    }
}
