#![forbid(unsafe_code)]

//! Reactive string-case conversion.
//!
//! Word boundaries come from `heck`: case changes, digits followed by
//! letters, and any non-alphanumeric run all split words, and the
//! separators themselves are dropped. [`ChangeCaseOptions`] can swap the
//! joining delimiter and keep leading or trailing marker characters.

use std::fmt;
use std::str::FromStr;

use composa_core::reactive::{Computed, MaybeReactive};
use composa_core::{ComposeError, Result};
use heck::ToSnakeCase;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A case style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CaseMethod {
    /// `twoWords`
    Camel,
    /// `Two Words`
    Capital,
    /// `TWO_WORDS`
    Constant,
    /// `two.words`
    Dot,
    /// `two-words`
    Kebab,
    /// `two words`
    No,
    /// `TwoWords`
    Pascal,
    /// `Two_Words`
    PascalSnake,
    /// `two/words`
    Path,
    /// `Two words`
    Sentence,
    /// `two_words`
    Snake,
    /// `Two-Words`
    Train,
}

impl CaseMethod {
    pub const ALL: [Self; 12] = [
        Self::Camel,
        Self::Capital,
        Self::Constant,
        Self::Dot,
        Self::Kebab,
        Self::No,
        Self::Pascal,
        Self::PascalSnake,
        Self::Path,
        Self::Sentence,
        Self::Snake,
        Self::Train,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Camel => "camel",
            Self::Capital => "capital",
            Self::Constant => "constant",
            Self::Dot => "dot",
            Self::Kebab => "kebab",
            Self::No => "no",
            Self::Pascal => "pascal",
            Self::PascalSnake => "pascal_snake",
            Self::Path => "path",
            Self::Sentence => "sentence",
            Self::Snake => "snake",
            Self::Train => "train",
        }
    }

    /// Convert `input` to this case.
    #[must_use]
    pub fn apply(self, input: &str) -> String {
        self.apply_with(input, &ChangeCaseOptions::default())
    }

    /// Convert `input` to this case under `options`.
    #[must_use]
    pub fn apply_with(self, input: &str, options: &ChangeCaseOptions) -> String {
        let (prefix, body, suffix) = options.split_affixes(input);
        let words: Vec<String> = body
            .to_snake_case()
            .split('_')
            .filter(|word| !word.is_empty())
            .map(str::to_owned)
            .collect();
        let delimiter = options.delimiter.as_deref().unwrap_or(self.delimiter());
        let cased: Vec<String> = words
            .iter()
            .enumerate()
            .map(|(index, word)| self.case_word(index, word))
            .collect();
        format!("{prefix}{}{suffix}", cased.join(delimiter))
    }

    /// The separator placed between words by default.
    #[must_use]
    pub const fn delimiter(self) -> &'static str {
        match self {
            Self::Camel | Self::Pascal => "",
            Self::Capital | Self::No | Self::Sentence => " ",
            Self::Constant | Self::PascalSnake | Self::Snake => "_",
            Self::Dot => ".",
            Self::Kebab | Self::Train => "-",
            Self::Path => "/",
        }
    }

    /// Case one lower-case word found at position `index`.
    fn case_word(self, index: usize, word: &str) -> String {
        match self {
            Self::Camel if index == 0 => word.to_owned(),
            Self::Camel | Self::Capital | Self::Pascal | Self::PascalSnake | Self::Train => {
                capitalize_first(word)
            }
            Self::Sentence if index == 0 => capitalize_first(word),
            Self::Constant => word.to_uppercase(),
            Self::Dot | Self::Kebab | Self::No | Self::Path | Self::Sentence | Self::Snake => {
                word.to_owned()
            }
        }
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Tweaks applied on top of a [`CaseMethod`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChangeCaseOptions {
    /// Joins words instead of the method's own separator.
    pub delimiter: Option<String>,
    /// Leading characters from this set are kept as they are.
    pub prefix_characters: String,
    /// Trailing characters from this set are kept as they are.
    pub suffix_characters: String,
}

impl ChangeCaseOptions {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    #[must_use]
    pub fn with_prefix_characters(mut self, characters: impl Into<String>) -> Self {
        self.prefix_characters = characters.into();
        self
    }

    #[must_use]
    pub fn with_suffix_characters(mut self, characters: impl Into<String>) -> Self {
        self.suffix_characters = characters.into();
        self
    }

    /// Split `input` into kept prefix, convertible body and kept suffix.
    fn split_affixes<'a>(&self, input: &'a str) -> (&'a str, &'a str, &'a str) {
        let rest = input.trim_start_matches(|c: char| self.prefix_characters.contains(c));
        let prefix = &input[..input.len() - rest.len()];
        let body = rest.trim_end_matches(|c: char| self.suffix_characters.contains(c));
        let suffix = &rest[body.len()..];
        (prefix, body, suffix)
    }
}

impl fmt::Display for CaseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An unrecognized case method name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown case method `{0}`")]
pub struct ParseCaseMethodError(pub String);

impl FromStr for CaseMethod {
    type Err = ParseCaseMethodError;

    /// Accepts `snake`, `snake_case`, `snakeCase` and the like.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.to_snake_case();
        let stem = normalized.strip_suffix("_case").unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|method| method.name() == stem)
            .ok_or_else(|| ParseCaseMethodError(s.to_owned()))
    }
}

/// A converted string that follows its input and method.
#[derive(Clone)]
pub struct ChangeCase {
    computed: Computed<String>,
    input: MaybeReactive<String>,
}

impl ChangeCase {
    /// The converted value, recomputed only after a source changed.
    #[must_use]
    pub fn get(&self) -> String {
        self.computed.get()
    }

    /// Write `value` through to the input. The read side converts it.
    ///
    /// # Errors
    ///
    /// [`ComposeError::ReadOnly`] when the input is a plain string.
    pub fn set(&self, value: impl Into<String>) -> Result<()> {
        match self.input.as_observable() {
            Some(input) => {
                input.set(value.into());
                Ok(())
            }
            None => Err(ComposeError::read_only("change case input")),
        }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.input.is_reactive()
    }

    /// How many times the conversion has run.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.computed.version()
    }
}

impl fmt::Debug for ChangeCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeCase")
            .field("computed", &self.computed)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Derive `method`-cased text from `input`. Input, method and options may
/// each be plain or observable.
pub fn use_change_case(
    input: impl Into<MaybeReactive<String>>,
    method: impl Into<MaybeReactive<CaseMethod>>,
    options: impl Into<MaybeReactive<ChangeCaseOptions>>,
) -> ChangeCase {
    let input = input.into();
    let method = method.into();
    let options = options.into();
    let (text, case, tweaks) = (input.clone(), method.clone(), options.clone());
    let computed = Computed::from_fn(
        move || case.get().apply_with(&text.get(), &tweaks.get()),
        Vec::new(),
    );
    if let Some(source) = input.as_observable() {
        computed.track(source);
    }
    if let Some(source) = method.as_observable() {
        computed.track(source);
    }
    if let Some(source) = options.as_observable() {
        computed.track(source);
    }
    ChangeCase { computed, input }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composa_core::reactive::Observable;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_method() {
        let cases = [
            (CaseMethod::Camel, "helloWorld"),
            (CaseMethod::Capital, "Hello World"),
            (CaseMethod::Constant, "HELLO_WORLD"),
            (CaseMethod::Dot, "hello.world"),
            (CaseMethod::Kebab, "hello-world"),
            (CaseMethod::No, "hello world"),
            (CaseMethod::Pascal, "HelloWorld"),
            (CaseMethod::PascalSnake, "Hello_World"),
            (CaseMethod::Path, "hello/world"),
            (CaseMethod::Sentence, "Hello world"),
            (CaseMethod::Snake, "hello_world"),
            (CaseMethod::Train, "Hello-World"),
        ];
        for (method, expected) in cases {
            assert_eq!(method.apply("hello world"), expected, "{method}");
            assert_eq!(method.apply("HelloWorld"), expected, "{method}");
        }
    }

    #[test]
    fn empty_input() {
        for method in CaseMethod::ALL {
            assert_eq!(method.apply(""), "", "{method}");
        }
    }

    #[test]
    fn delimiter_overrides_separator() {
        let options = ChangeCaseOptions::default().with_delimiter("+");
        assert_eq!(CaseMethod::Snake.apply_with("hello big world", &options), "hello+big+world");
        assert_eq!(CaseMethod::Pascal.apply_with("hello world", &options), "Hello+World");
        assert_eq!(CaseMethod::Camel.apply_with("hello world", &options), "hello+World");
        assert_eq!(CaseMethod::Constant.apply_with("hello", &options), "HELLO");
    }

    #[test]
    fn affix_characters_are_kept() {
        let options = ChangeCaseOptions::default()
            .with_prefix_characters("_$")
            .with_suffix_characters("_");
        assert_eq!(CaseMethod::Camel.apply_with("__private value_", &options), "__privateValue_");
        assert_eq!(CaseMethod::Kebab.apply_with("$ref name", &options), "$ref-name");
        assert_eq!(CaseMethod::Camel.apply("__private value_"), "privateValue");
        assert_eq!(CaseMethod::Snake.apply_with("___", &options), "___");
    }

    #[test]
    fn options_can_change_reactively() {
        let options = Observable::new(ChangeCaseOptions::default());
        let cased = use_change_case("foo bar", CaseMethod::Kebab, &options);
        assert_eq!(cased.get(), "foo-bar");

        options.set(ChangeCaseOptions::default().with_delimiter("~"));
        assert_eq!(cased.get(), "foo~bar");
    }

    #[test]
    fn parse_names() {
        assert_eq!("camelCase".parse::<CaseMethod>(), Ok(CaseMethod::Camel));
        assert_eq!("pascal_snake".parse::<CaseMethod>(), Ok(CaseMethod::PascalSnake));
        assert_eq!("pascalSnakeCase".parse::<CaseMethod>(), Ok(CaseMethod::PascalSnake));
        assert_eq!("no".parse::<CaseMethod>(), Ok(CaseMethod::No));
        assert_eq!(
            "shout".parse::<CaseMethod>(),
            Err(ParseCaseMethodError("shout".into()))
        );
        for method in CaseMethod::ALL {
            assert_eq!(method.to_string().parse::<CaseMethod>(), Ok(method));
        }
    }

    #[test]
    fn follows_input_and_method() {
        let input = Observable::new("foo bar".to_owned());
        let method = Observable::new(CaseMethod::Kebab);
        let cased = use_change_case(&input, &method, ChangeCaseOptions::default());
        assert_eq!(cased.get(), "foo-bar");

        input.set("baz qux".into());
        assert_eq!(cased.get(), "baz-qux");

        method.set(CaseMethod::Constant);
        assert_eq!(cased.get(), "BAZ_QUX");
    }

    #[test]
    fn memoized_between_changes() {
        let input = Observable::new("foo bar".to_owned());
        let cased = use_change_case(&input, CaseMethod::Camel, ChangeCaseOptions::default());
        assert_eq!(cased.get(), "fooBar");
        assert_eq!(cased.get(), "fooBar");
        assert_eq!(cased.version(), 1);

        input.set("foo baz".into());
        assert_eq!(cased.get(), "fooBaz");
        assert_eq!(cased.version(), 2);
    }

    #[test]
    fn writes_through_observable_input() {
        let input = Observable::new("foo bar".to_owned());
        let cased = use_change_case(&input, CaseMethod::Snake, ChangeCaseOptions::default());
        assert!(cased.is_writable());
        cased.set("New Value").unwrap();
        assert_eq!(input.get(), "New Value");
        assert_eq!(cased.get(), "new_value");
    }

    #[test]
    fn static_input_is_read_only() {
        let cased = use_change_case("foo bar", CaseMethod::Pascal, ChangeCaseOptions::default());
        assert_eq!(cased.get(), "FooBar");
        assert_eq!(
            cased.set("x"),
            Err(ComposeError::read_only("change case input"))
        );
    }
}
