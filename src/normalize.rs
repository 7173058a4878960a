//! Markdown cleanup for generated summaries
//!
//! Each step is a total function over text. `normalize` runs
//! them in order and repeats the chain until nothing changes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static RE_HEADING: Lazy<Regex> = Lazy::new(||
  Regex::new(r"(?m)^#{1,6}(?:[ \t]+|$)").expect("valid regex")
);
static RE_BOLD_STAR: Lazy<Regex> = Lazy::new(||
  Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex")
);
static RE_ITALIC_STAR: Lazy<Regex> = Lazy::new(||
  Regex::new(r"\*([^*\n]+?)\*").expect("valid regex")
);
static RE_BOLD_UNDERSCORE: Lazy<Regex> = Lazy::new(||
  Regex::new(r"__([^_\n]+?)__").expect("valid regex")
);
static RE_ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(||
  Regex::new(r"_([^_\n]+?)_").expect("valid regex")
);
static RE_RULE: Lazy<Regex> = Lazy::new(||
  Regex::new(r"(?m)^(?:-{3,}|\*{3,}|_{3,})[ \t]*\r?$").expect("valid regex")
);
static RE_MULTI_NEWLINE: Lazy<Regex> = Lazy::new(||
  Regex::new(r"\n{3,}").expect("valid regex")
);

/// Drop `#`..`######` heading markers at line start
pub fn strip_headings(text: &str) -> Cow<'_, str>
{   RE_HEADING.replace_all(text, "")
}

/// Unwrap `**x**`, `*x*`, `__x__` and `_x_`, keeping `x`.
/// A marker pair never spans a line break.
pub fn strip_emphasis(text: &str) -> Cow<'_, str>
{   let text = RE_BOLD_STAR.replace_all(text, "$1");
    let text = match text
    {   Cow::Borrowed(s) => RE_ITALIC_STAR.replace_all(s, "$1")
      , Cow::Owned(s) => Cow::Owned(
          RE_ITALIC_STAR.replace_all(&s, "$1").into_owned()
        )
    };
    let text = match text
    {   Cow::Borrowed(s) => RE_BOLD_UNDERSCORE.replace_all(s, "$1")
      , Cow::Owned(s) => Cow::Owned(
          RE_BOLD_UNDERSCORE.replace_all(&s, "$1").into_owned()
        )
    };
    match text
    {   Cow::Borrowed(s) => RE_ITALIC_UNDERSCORE.replace_all(s, "$1")
      , Cow::Owned(s) => Cow::Owned(
          RE_ITALIC_UNDERSCORE.replace_all(&s, "$1").into_owned()
        )
    }
}

/// Blank out horizontal-rule lines (`---`, `***`, `___`)
pub fn strip_rules(text: &str) -> Cow<'_, str>
{   RE_RULE.replace_all(text, "")
}

/// Collapse runs of 3+ newlines down to one blank line
pub fn collapse_blank_lines(text: &str) -> Cow<'_, str>
{   RE_MULTI_NEWLINE.replace_all(text, "\n\n")
}

fn single_pass(text: &str) -> String
{   let text = strip_headings(text);
    let text = strip_emphasis(&text).into_owned();
    let text = strip_rules(&text).into_owned();
    let text = collapse_blank_lines(&text);
    text.trim().to_string()
}

/// Turn raw generated markdown into plain text.
///
/// Every step only ever removes characters, so repeating the
/// chain terminates; stopping at the fixed point makes
/// `normalize(normalize(x)) == normalize(x)` hold for any input,
/// including markers that only surface after an earlier step
/// (`**## x**`, or `  ## x` after trimming).
pub fn normalize(text: &str) -> String
{   let mut current = single_pass(text);
    loop
    {   let next = single_pass(&current);
        if next == current
        {   return current;
        }
        current = next;
    }
}
