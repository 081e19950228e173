//! Loading of TrafCOD program text.

use crate::error::{Error, Location, ParseError, Result};
use crate::ident::Identifier;
use crate::light::LightColor;
use crate::parser::parse_rule;
use crate::rule::Rule;
use crate::util::{fields, strip_prefix_ignore_case};
use crate::variable::{Flags, VariableTable};
use crate::VariableId;
use std::str::FromStr;

/// The version of the TrafCOD language that is supported.
pub const TRAFCOD_VERSION: i32 = 100;

const COMMENT_PREFIX: char = '#';
const VERSION_PREFIX: &str = "trafcod-version=";
const SEQUENCE_KEY: &str = "Sequence";
const STRUCTURE_PREFIX: &str = "Structure:";
const INIT_KEY: &str = "%init";
const TIME_KEY: &str = "%time";
const EXPORT_KEY: &str = "%export";
/// Stream numbers have two digits, so a conflict group has at most this many streams.
const MAX_GROUP_SIZE: usize = 100;

/// A loaded TrafCOD program.
#[derive(Clone, Debug, Default)]
pub struct Program {
    /// The variables, in definition order.
    pub(crate) variables: VariableTable,
    /// The tokenized rules, in definition order.
    pub(crate) rules: Vec<Rule>,
    /// The streams of each conflict group, indexed by conflict group rank.
    pub(crate) conflict_groups: Vec<Vec<u8>>,
    /// The structure number from the `# Structure:` header.
    pub(crate) structure_number: Option<i32>,
}

impl Program {
    /// Loads a program from its text.
    pub fn parse(text: &str) -> Result<Self> {
        Loader::new(text).load()
    }

    /// Gets the variables of the program.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Gets the rules of the program.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Gets the streams of each conflict group.
    pub fn conflict_groups(&self) -> &[Vec<u8>] {
        &self.conflict_groups
    }

    pub fn structure_number(&self) -> Option<i32> {
        self.structure_number
    }
}

impl FromStr for Program {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Self::parse(text)
    }
}

/// Reads a program line by line.
struct Loader<'a> {
    /// The trimmed lines.
    lines: Vec<&'a str>,
    /// The index of the next line.
    next: usize,
    program: Program,
    version_seen: bool,
    /// The number of conflict groups and their size from the `# Sequence` header.
    sequence: Option<(usize, usize)>,
}

impl<'a> Loader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().map(str::trim).collect(),
            next: 0,
            program: Program::default(),
            version_seen: false,
            sequence: None,
        }
    }

    fn load(mut self) -> Result<Program> {
        while let Some((location, line)) = self.next_line() {
            self.line(line, location)
                .map_err(|kind| kind.at(location))?;
        }
        if !self.version_seen {
            let location = Location {
                line: self.lines.len(),
            };
            return Err(ParseError::MissingVersion.at(location));
        }
        Ok(self.program)
    }

    /// Gets the next line and its location.
    fn next_line(&mut self) -> Option<(Location, &'a str)> {
        let line = *self.lines.get(self.next)?;
        self.next += 1;
        Some((Location { line: self.next }, line))
    }

    /// Gets the next line that is not blank and not a comment.
    fn next_data_line(&mut self, reading: &'static str) -> std::result::Result<&'a str, ParseError> {
        loop {
            match self.next_line() {
                None => return Err(ParseError::UnexpectedEof(reading)),
                Some((_, line)) if line.is_empty() || line.starts_with(COMMENT_PREFIX) => {}
                Some((_, line)) => return Ok(line),
            }
        }
    }

    fn line(&mut self, line: &str, location: Location) -> std::result::Result<(), ParseError> {
        if line.is_empty() {
            return Ok(());
        }
        if let Some(comment) = line.strip_prefix(COMMENT_PREFIX) {
            return self.comment(comment.trim());
        }
        let fields = fields(line);
        match fields[0] {
            key if key.eq_ignore_ascii_case(INIT_KEY) => {
                let id = self.variable(line, &fields)?;
                // The initial value, if given, is ignored
                self.program.variables[id].set_flag(Flags::INITED);
            }
            key if key.eq_ignore_ascii_case(TIME_KEY) => {
                let id = self.variable(line, &fields)?;
                let value = fields.get(2).ok_or_else(|| ParseError::MissingValue(line.into()))?;
                let value = value
                    .parse()
                    .map_err(|_| ParseError::BadValue(value.to_string()))?;
                self.program.variables[id].set_timer_max(value)?;
            }
            key if key.eq_ignore_ascii_case(EXPORT_KEY) => {
                let id = self.variable(line, &fields)?;
                let value = fields.get(2).ok_or_else(|| ParseError::MissingValue(line.into()))?;
                let color = parse_color(value).ok_or_else(|| ParseError::BadColor(value.to_string()))?;
                self.program.variables[id].set_output(color)?;
            }
            _ => {
                let rule = parse_rule(line, location, &mut self.program.variables)?;
                self.program.rules.push(rule);
            }
        }
        Ok(())
    }

    /// Installs the variable named in the second field of a `%` line.
    fn variable(&mut self, line: &str, fields: &[&str]) -> std::result::Result<VariableId, ParseError> {
        let name = fields.get(1).ok_or_else(|| ParseError::MissingValue(line.into()))?;
        let ident = Identifier::parse(name)?;
        Ok(self.program.variables.install(&ident.name, ident.stream))
    }

    fn comment(&mut self, comment: &str) -> std::result::Result<(), ParseError> {
        if let Some(version) = strip_prefix_ignore_case(comment, VERSION_PREFIX) {
            let version = version.trim();
            let got = version
                .parse()
                .map_err(|_| ParseError::BadVersion(version.into()))?;
            if got != TRAFCOD_VERSION {
                return Err(ParseError::WrongVersion {
                    expected: TRAFCOD_VERSION,
                    got,
                });
            }
            self.version_seen = true;
        } else if strip_prefix_ignore_case(comment, SEQUENCE_KEY).is_some() {
            let line = self.next_data_line("sequence information")?;
            let bad = || ParseError::BadSequence(line.into());
            let sequence: (usize, usize) = match fields(line)[..] {
                [groups, size] => (
                    groups.parse().map_err(|_| bad())?,
                    size.parse().map_err(|_| bad())?,
                ),
                _ => return Err(bad()),
            };
            if sequence.1 > MAX_GROUP_SIZE {
                return Err(bad());
            }
            self.sequence = Some(sequence);
        } else if let Some(number) = strip_prefix_ignore_case(comment, STRUCTURE_PREFIX) {
            let number = number.trim();
            let number = number
                .parse()
                .map_err(|_| ParseError::BadStructureNumber(number.into()))?;
            let (groups, size) = self.sequence.ok_or(ParseError::StructureBeforeSequence)?;
            self.program.structure_number = Some(number);
            self.program.conflict_groups = vec![Vec::new(); size];
            for _ in 0..groups {
                let line = self.next_data_line("conflict groups")?;
                let streams = fields(line);
                if streams.len() != size {
                    return Err(ParseError::BadConflictGroup(line.into()));
                }
                for (col, stream) in streams.iter().enumerate() {
                    let stream = stream
                        .parse()
                        .map_err(|_| ParseError::BadConflictGroup(line.into()))?;
                    self.program.conflict_groups[col].push(stream);
                }
            }
        }
        Ok(())
    }
}

/// Parses the color of an exported variable: a color letter or its character code.
fn parse_color(value: &str) -> Option<LightColor> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) if !code.is_ascii_digit() => LightColor::from_code(code),
        _ => {
            let code: u8 = value.parse().ok()?;
            LightColor::from_code(code as char)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HEADER: &str = "# trafcod-version=100\n";

    fn load(body: &str) -> Result<Program> {
        Program::parse(&format!("{}{}", HEADER, body))
    }

    fn parse_error(result: Result<Program>) -> (ParseError, usize) {
        match result {
            Err(Error::Parse { kind, location }) => (kind, location.line),
            other => panic!("expected a parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rules_and_directives() {
        let program = load(
            "%init A01 1\n\
             %time TA01 30\n\
             %export A01 G\n\
             %EXPORT B01 82\n\
             \n\
             ITA01.=SA01\n\
             \tB01 = TA01 \n",
        )
        .unwrap();
        let vars = program.variables();
        let a = vars.lookup("A", Some(1)).unwrap();
        let ta = vars.lookup("TA", Some(1)).unwrap();
        let b = vars.lookup("B", Some(1)).unwrap();
        assert!(vars[a].flags().contains(Flags::INITED));
        assert_eq!(vars[a].color(), Some(LightColor::Green));
        assert_eq!(vars[b].color(), Some(LightColor::Red));
        assert_eq!(vars[ta].timer_max(), 30);
        assert_eq!(program.rules().len(), 2);
        assert_eq!(program.rules()[1].location, Location { line: 8 });
        assert_eq!(program.structure_number(), None);
    }

    #[test]
    fn structure() {
        let program = load(
            "# Sequence\n\
             # groups and size\n\
             2\t3\n\
             # Structure: 4\n\
             01 02 03\n\
             # comment\n\
             04 05 06\n",
        )
        .unwrap();
        assert_eq!(program.structure_number(), Some(4));
        assert_eq!(
            program.conflict_groups(),
            &[vec![1u8, 4], vec![2, 5], vec![3, 6]]
        );
    }

    #[test]
    fn version() {
        assert_eq!(
            parse_error(Program::parse("A=B\n")),
            (ParseError::MissingVersion, 1)
        );
        assert_eq!(
            parse_error(Program::parse("# TrafCOD-version=99")),
            (
                ParseError::WrongVersion {
                    expected: 100,
                    got: 99
                },
                1
            )
        );
        assert_eq!(
            parse_error(Program::parse("\n# trafcod-version=x")),
            (ParseError::BadVersion("x".into()), 2)
        );
    }

    #[test]
    fn header_errors() {
        assert_eq!(
            parse_error(load("# Sequence\n")),
            (ParseError::UnexpectedEof("sequence information"), 2)
        );
        assert_eq!(
            parse_error(load("# Sequence\n1 2 3\n")),
            (ParseError::BadSequence("1 2 3".into()), 2)
        );
        assert_eq!(
            parse_error(load("# Sequence\n1 4000000000\n# Structure: 1\n01 02\n")),
            (ParseError::BadSequence("1 4000000000".into()), 2)
        );
        assert_eq!(
            parse_error(load("# Structure: 1\n")),
            (ParseError::StructureBeforeSequence, 2)
        );
        assert_eq!(
            parse_error(load("# Sequence\n1 2\n# Structure: 1\n01\n")),
            (ParseError::BadConflictGroup("01".into()), 4)
        );
        assert_eq!(
            parse_error(load("# Sequence\n1 2\n# Structure: x\n")),
            (ParseError::BadStructureNumber("x".into()), 4)
        );
    }

    #[test]
    fn directive_errors() {
        assert_eq!(
            parse_error(load("%time A 30\n")),
            (ParseError::NotATimer("A".into()), 2)
        );
        assert_eq!(
            parse_error(load("%time TA\n")),
            (ParseError::MissingValue("%time TA".into()), 2)
        );
        assert_eq!(
            parse_error(load("%export A01 Q\n")),
            (ParseError::BadColor("Q".into()), 2)
        );
        assert_eq!(
            parse_error(load("%export A01 G\n%export A01 R\n")),
            (ParseError::AlreadyOutput("A01".into()), 3)
        );
    }

    #[test]
    fn rule_errors_carry_the_line() {
        let err = load("A=B\nA=C\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "conflicting rules: TrafCOD rule(2) vs TrafCOD rule(3) at TrafCOD rule(3)"
        );
    }
}
