//! Interactive session state.
//!
//! A session owns the [`ViewState`] and mutates it in response to user
//! events (year toggle, metro selection, filter change, clear). Each
//! command line typed in interactive mode parses into one [`Event`].

use crate::models::{Filter, Metric, Selection, ViewState, Year};
use std::path::PathBuf;
use std::str::FromStr;

/// A single user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SetYear(Year),
    Select(Selection),
    ClearSelection,
    SetGender(Filter),
    SetRace(Filter),
    SetMetric(Metric),
    Show,
    Options,
    ListMetros,
    Export(PathBuf),
    Help,
    Quit,
}

impl FromStr for Event {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let require = |what: &str| require_argument(command, rest, what);

        match command.to_lowercase().as_str() {
            "year" => Ok(Event::SetYear(require("a year")?.parse()?)),
            "select" | "metro" => {
                let selection: Selection = require("a GEOID")?.parse().unwrap_or_default();
                Ok(Event::Select(selection))
            }
            "clear" | "national" => Ok(Event::ClearSelection),
            "gender" => Ok(Event::SetGender(require("a gender or 'all'")?.parse().unwrap_or_default())),
            "race" => Ok(Event::SetRace(require("a race/ethnicity or 'all'")?.parse().unwrap_or_default())),
            "metric" => Ok(Event::SetMetric(require("'rate' or 'share'")?.parse()?)),
            "show" | "" => Ok(Event::Show),
            "options" => Ok(Event::Options),
            "metros" | "list" => Ok(Event::ListMetros),
            "export" => Ok(Event::Export(PathBuf::from(require("a file path")?))),
            "help" | "?" => Ok(Event::Help),
            "quit" | "exit" | "q" => Ok(Event::Quit),
            other => Err(format!("Unknown command '{}' (type 'help')", other)),
        }
    }
}

fn require_argument<'a>(command: &str, rest: &'a str, what: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("'{}' needs {}", command, what))
    } else {
        Ok(rest)
    }
}

/// What the caller should do after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The view changed (or was requested) and should be re-rendered.
    Render,
    ShowOptions,
    ListMetros,
    Export(PathBuf),
    Help,
    Quit,
}

/// Explicit session context: the single source of truth for the view.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: ViewState,
}

impl Session {
    pub fn new(state: ViewState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Apply one event to the view state.
    pub fn apply(&mut self, event: Event) -> Action {
        match event {
            Event::SetYear(year) => self.state.year = year,
            Event::Select(selection) => self.state.selection = selection,
            Event::ClearSelection => self.state.selection = Selection::National,
            Event::SetGender(filter) => self.state.gender = filter,
            Event::SetRace(filter) => self.state.race = filter,
            Event::SetMetric(metric) => self.state.metric = metric,
            Event::Show => {}
            Event::Options => return Action::ShowOptions,
            Event::ListMetros => return Action::ListMetros,
            Event::Export(path) => return Action::Export(path),
            Event::Help => return Action::Help,
            Event::Quit => return Action::Quit,
        }
        Action::Render
    }
}

/// Help text for interactive mode.
pub const HELP: &str = "\
Commands:
  year <2022|2023>       switch the displayed year
  select <GEOID>         show one metro area
  clear                  back to the national view
  gender <value|all>     filter by gender
  race <value|all>       filter by race/ethnicity
  metric <rate|share>    OY rate within group, or share of total OY
  show                   re-render the current view
  options                list available filter values
  metros                 list metro areas
  export <file>          write the current table (.md, .json or .csv)
  help                   this text
  quit                   leave";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        assert_eq!("year 2022".parse::<Event>(), Ok(Event::SetYear(Year::Y2022)));
        assert_eq!(
            "select 35620".parse::<Event>(),
            Ok(Event::Select(Selection::Metro("35620".to_string())))
        );
        assert_eq!("clear".parse::<Event>(), Ok(Event::ClearSelection));
        assert_eq!(
            "race Black or African American".parse::<Event>(),
            Ok(Event::SetRace(Filter::Only("Black or African American".to_string())))
        );
        assert_eq!("gender ALL".parse::<Event>(), Ok(Event::SetGender(Filter::All)));
        assert_eq!("metric share".parse::<Event>(), Ok(Event::SetMetric(Metric::Share)));
        assert_eq!(
            "export out.csv".parse::<Event>(),
            Ok(Event::Export(PathBuf::from("out.csv")))
        );
        assert_eq!("".parse::<Event>(), Ok(Event::Show));
        assert_eq!("QUIT".parse::<Event>(), Ok(Event::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!("year 2019".parse::<Event>().is_err());
        assert!("year".parse::<Event>().is_err());
        assert!("metric median".parse::<Event>().is_err());
        assert!("zoom 4".parse::<Event>().is_err());
    }

    #[test]
    fn test_apply_events() {
        let mut session = Session::default();

        assert_eq!(session.apply(Event::Select(Selection::Metro("111".into()))), Action::Render);
        assert_eq!(session.apply(Event::SetYear(Year::Y2022)), Action::Render);
        session.apply(Event::SetGender(Filter::Only("Female".into())));
        assert_eq!(session.state().selection, Selection::Metro("111".into()));
        assert_eq!(session.state().year, Year::Y2022);

        session.apply(Event::ClearSelection);
        assert_eq!(session.state().selection, Selection::National);
        // Filters survive a selection change.
        assert_eq!(session.state().gender, Filter::Only("Female".into()));
    }

    #[test]
    fn test_non_mutating_events() {
        let mut session = Session::default();
        let before = session.state().clone();

        assert_eq!(session.apply(Event::Options), Action::ShowOptions);
        assert_eq!(session.apply(Event::Quit), Action::Quit);
        assert_eq!(
            session.apply(Event::Export(PathBuf::from("t.md"))),
            Action::Export(PathBuf::from("t.md"))
        );
        assert_eq!(session.state(), &before);
    }
}
