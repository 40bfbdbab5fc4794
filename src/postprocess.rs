use crate::config::Config;
use anyhow::Result;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Compiled line filters, built once per run.
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    patterns: Vec<Regex>,
}

impl LineFilter {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if !cfg.postprocess.remove_by_regex {
            return Ok(Self::default());
        }
        let patterns = cfg
            .postprocess
            .regex
            .patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    fn rejects(&self, line: &str) -> bool {
        self.patterns.iter().any(|r| r.is_match(line.trim()))
    }
}

/// Clean recognized lines while keeping engine order.
pub fn clean_lines(cfg: &Config, filter: &LineFilter, lines: Vec<String>) -> Vec<String> {
    let pp = &cfg.postprocess;
    lines
        .into_iter()
        .map(|l| {
            let l = if pp.normalize_unicode {
                l.nfkc().collect::<String>()
            } else {
                l
            };
            if pp.trim_whitespace {
                l.trim().to_string()
            } else {
                l
            }
        })
        .filter(|l| !(pp.drop_empty_lines && l.trim().is_empty()))
        .filter(|l| !filter.rejects(l))
        .collect()
}

pub fn page_label(cfg: &Config, index: usize) -> String {
    cfg.output.page_label.replace("{n}", &(index + 1).to_string())
}

/// Page display block: label line, then the page's lines.
pub fn page_block(cfg: &Config, index: usize, lines: &[String]) -> String {
    let mut block = page_label(cfg, index);
    block.push('\n');
    block.push_str(&lines.join("\n"));
    block.push('\n');
    block
}

/// Full transcript from page blocks, one blank line between pages.
pub fn join_pages<I, S>(blocks: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for block in blocks {
        out.push_str(block.as_ref());
        out.push('\n');
    }
    out
}
