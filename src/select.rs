use regex::{Regex, RegexBuilder};
use std::io::{self, BufRead, Write};
use std::num::IntErrorKind;
use thiserror::Error;

use crate::model::PodRef;

// Namespace names are at most 63 characters; anything near this limit is not a name.
const PATTERN_SIZE_LIMIT: usize = 1 << 16;

pub trait Candidate {
    fn label(&self) -> &str;
}

impl Candidate for PodRef {
    fn label(&self) -> &str {
        self.name()
    }
}

impl Candidate for String {
    fn label(&self) -> &str {
        self
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no {noun} to select from")]
    Empty { noun: &'static str },
    #[error("failed to read selection")]
    Read(#[source] io::Error),
    #[error("no selection was entered")]
    NoInput,
    #[error("'{input}' is not a valid index")]
    NotANumber { input: String },
    #[error("index {index} is out of range [0-{max}]")]
    OutOfRange { index: String, max: usize },
    #[error("no {noun} named '{name}'")]
    UnknownName { noun: &'static str, name: String },
    #[error("search pattern is not usable")]
    Pattern(#[source] regex::Error),
}

/// Candidates in the order the cluster returned them. The index shown to the
/// operator is the position in this list.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CandidateList<T> {
    noun: &'static str,
    items: Vec<T>,
}

impl<T> CandidateList<T>
where
    T: Candidate + Clone,
{
    pub fn new(noun: &'static str, items: Vec<T>) -> Self {
        Self { noun, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn render<W: Write>(&self, output: &mut W) -> io::Result<()> {
        for (index, item) in self.items.iter().enumerate() {
            writeln!(output, "[{index}] {}", item.label())?;
        }
        Ok(())
    }

    pub fn pick(&self, raw: &str) -> Result<T, SelectionError> {
        if self.items.is_empty() {
            return Err(SelectionError::Empty { noun: self.noun });
        }

        let trimmed = raw.trim();
        let out_of_range = || SelectionError::OutOfRange {
            index: trimmed.to_string(),
            max: self.items.len() - 1,
        };
        let index = match trimmed.parse::<i64>() {
            Ok(index) => index,
            Err(error)
                if matches!(
                    error.kind(),
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
                ) =>
            {
                return Err(out_of_range());
            }
            Err(_) => {
                return Err(SelectionError::NotANumber {
                    input: trimmed.to_string(),
                });
            }
        };

        usize::try_from(index)
            .ok()
            .and_then(|position| self.items.get(position))
            .cloned()
            .ok_or_else(out_of_range)
    }

    pub fn find_by_name(&self, name: &str) -> Result<T, SelectionError> {
        self.items
            .iter()
            .find(|item| item.label() == name)
            .cloned()
            .ok_or_else(|| SelectionError::UnknownName {
                noun: self.noun,
                name: name.to_string(),
            })
    }

    /// Shows the menu, reads one line and resolves it. A bad answer ends the
    /// selection; there is no second attempt.
    pub fn prompt<R, W>(&self, heading: &str, input: &mut R, output: &mut W) -> Result<T, SelectionError>
    where
        R: BufRead,
        W: Write,
    {
        if self.items.is_empty() {
            return Err(SelectionError::Empty { noun: self.noun });
        }

        writeln!(output, "{heading}").map_err(SelectionError::Read)?;
        self.render(output).map_err(SelectionError::Read)?;
        write!(output, "Select a {}: ", self.noun).map_err(SelectionError::Read)?;
        output.flush().map_err(SelectionError::Read)?;

        let mut line = String::new();
        let read = input.read_line(&mut line).map_err(SelectionError::Read)?;
        if read == 0 {
            return Err(SelectionError::NoInput);
        }

        self.pick(&line)
    }
}

/// Case-insensitive matcher that takes the pattern literally.
pub fn namespace_matcher(pattern: &str) -> Result<Regex, SelectionError> {
    RegexBuilder::new(&regex::escape(pattern))
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(SelectionError::Pattern)
}

pub fn filter_namespaces(names: Vec<String>, matcher: &Regex) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| matcher.is_match(&name.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{CandidateList, SelectionError, filter_namespaces, namespace_matcher};
    use crate::model::PodRef;

// Namespace names are at most 63 characters; anything near this limit is not a name.
const PATTERN_SIZE_LIMIT: usize = 1 << 16;
    use std::io::Cursor;

    fn pods() -> CandidateList<PodRef> {
        CandidateList::new(
            "pod",
            vec![
                PodRef::new("api-0", "shop"),
                PodRef::new("api-1", "shop"),
                PodRef::new("worker-0", "shop"),
            ],
        )
    }

    #[test]
    fn every_valid_index_yields_that_candidate() {
        let list = pods();
        for (index, expected) in list.items().iter().enumerate() {
            let picked = list.pick(&index.to_string()).expect("index is in range");
            assert_eq!(&picked, expected);
        }
    }

    #[test]
    fn out_of_range_indices_report_the_valid_range() {
        let list = pods();
        for raw in ["3", "17", "-1", "99999999999999999999", "-99999999999999999999"] {
            let error = list.pick(raw).expect_err("index is out of range");
            assert!(matches!(error, SelectionError::OutOfRange { max: 2, .. }));
            assert!(error.to_string().contains("[0-2]"));
        }
    }

    #[test]
    fn non_numeric_input_is_rejected() {
        let list = pods();
        let mut input = Cursor::new(b"abc\n".to_vec());
        let mut output = Vec::new();

        let error = list
            .prompt("Pods from shop namespace:", &mut input, &mut output)
            .expect_err("abc is not an index");
        assert!(matches!(error, SelectionError::NotANumber { ref input } if input == "abc"));
    }

    #[test]
    fn prompt_renders_menu_in_list_order() {
        let list = pods();
        let mut input = Cursor::new(b" 1 \n".to_vec());
        let mut output = Vec::new();

        let picked = list
            .prompt("Pods from shop namespace:", &mut input, &mut output)
            .expect("1 is in range");
        assert_eq!(picked.name(), "api-1");

        let rendered = String::from_utf8(output).expect("menu is utf-8");
        assert_eq!(
            rendered,
            "Pods from shop namespace:\n[0] api-0\n[1] api-1\n[2] worker-0\nSelect a pod: "
        );
    }

    #[test]
    fn empty_input_and_empty_lists_fail() {
        let list = pods();
        let mut output = Vec::new();
        let error = list
            .prompt("heading", &mut Cursor::new(Vec::new()), &mut output)
            .expect_err("no input");
        assert!(matches!(error, SelectionError::NoInput));

        let empty: CandidateList<PodRef> = CandidateList::new("pod", Vec::new());
        let error = empty
            .prompt("heading", &mut Cursor::new(b"0\n".to_vec()), &mut output)
            .expect_err("nothing to pick");
        assert_eq!(error.to_string(), "no pod to select from");
    }

    #[test]
    fn find_by_name_skips_the_prompt() {
        let list = pods();
        assert_eq!(
            list.find_by_name("worker-0").expect("present").name(),
            "worker-0"
        );
        assert!(matches!(
            list.find_by_name("worker-9"),
            Err(SelectionError::UnknownName { .. })
        ));
    }

    #[test]
    fn namespace_pattern_is_literal_and_case_insensitive() {
        let names = vec![
            "dev.ops".to_string(),
            "devXops".to_string(),
            "Team-DEV.OPS-blue".to_string(),
            "billing".to_string(),
        ];

        let matcher = namespace_matcher("DEV.ops").expect("escaped pattern compiles");
        assert_eq!(
            filter_namespaces(names, &matcher),
            vec!["dev.ops".to_string(), "Team-DEV.OPS-blue".to_string()]
        );
    }

    #[test]
    fn regex_metacharacters_compile_literally() {
        let matcher = namespace_matcher("a+(b").expect("escaped pattern compiles");
        assert!(matcher.is_match("xa+(by"));
        assert!(!matcher.is_match("aab"));
    }

    #[test]
    fn oversized_pattern_is_a_selection_error() {
        let error = namespace_matcher(&"x".repeat(100_000)).expect_err("pattern is too large");
        assert!(matches!(error, SelectionError::Pattern(_)));
    }
}
