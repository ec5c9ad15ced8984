//! history::revspec
//!
//! Parsing of revision expressions such as `HEAD~2`, `master^2` or
//! `1a2b3c4d^{tree}`.

/// One navigation step applied after the base revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// `~N`: follow the first parent N times.
    Ancestor(usize),
    /// `^N`: select the N-th parent (`^0` is the commit itself).
    Parent(usize),
}

/// A parsed revision expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RevSpec<'a> {
    pub base: &'a str,
    pub steps: Vec<Step>,
    pub peel_tree: bool,
}

const TREE_SUFFIX: &str = "^{tree}";

pub(crate) fn parse(rev: &str) -> Result<RevSpec<'_>, String> {
    let (rest, peel_tree) = match rev.strip_suffix(TREE_SUFFIX) {
        Some(rest) => (rest, true),
        None => (rev, false),
    };

    let split = rest.find(['~', '^']).unwrap_or(rest.len());
    let (base, mut tail) = rest.split_at(split);
    if base.is_empty() {
        return Err("missing base revision".into());
    }

    let mut steps = Vec::new();
    while let Some(op) = tail.chars().next() {
        tail = &tail[op.len_utf8()..];
        let digits = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        let count = if digits == 0 {
            1
        } else {
            tail[..digits]
                .parse()
                .map_err(|_| format!("bad count '{}'", &tail[..digits]))?
        };
        tail = &tail[digits..];

        steps.push(match op {
            '~' => Step::Ancestor(count),
            '^' => Step::Parent(count),
            other => return Err(format!("unexpected '{other}'")),
        });
    }

    Ok(RevSpec {
        base,
        steps,
        peel_tree,
    })
}
