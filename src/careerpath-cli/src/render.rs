//! Incremental terminal rendering of a streaming reply.

use std::io::{self, Write};

use careerpath_client::Citation;

/// Prints a reply as its cumulative text grows.
///
/// When the new text extends what is on screen only the suffix is written.
/// Anything else (a failure notice replacing a partial answer) is printed
/// again on a fresh line.
#[derive(Debug, Default)]
pub struct ReplyRenderer {
    printed: String,
}

impl ReplyRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<W: Write>(&mut self, text: &str, out: &mut W) -> io::Result<()> {
        if text == self.printed {
            return Ok(());
        }
        match text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => write!(out, "{suffix}")?,
            None => {
                if !self.printed.is_empty() {
                    writeln!(out)?;
                }
                write!(out, "{text}")?;
            }
        }
        self.printed = text.to_string();
        out.flush()
    }

    /// Terminate the reply line.
    pub fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.printed.is_empty() {
            writeln!(out)?;
        }
        self.printed.clear();
        out.flush()
    }
}

pub fn write_citations<W: Write>(citations: &[Citation], out: &mut W) -> io::Result<()> {
    if citations.is_empty() {
        return Ok(());
    }
    writeln!(out, "Sources:")?;
    for (i, citation) in citations.iter().enumerate() {
        let location = match (citation.topic.is_empty(), citation.section.is_empty()) {
            (true, true) => String::new(),
            (false, true) => format!(" [{}]", citation.topic),
            (true, false) => format!(" [{}]", citation.section),
            (false, false) => format!(" [{} / {}]", citation.topic, citation.section),
        };
        writeln!(out, "  {}.{location} {}", i + 1, excerpt(&citation.source_content))?;
    }
    Ok(())
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 160;
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    }
}
