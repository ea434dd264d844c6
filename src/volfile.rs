//! Parser for glusterfs `.vol` graphs.
//!
//! A volfile is a list of translator definitions:
//!
//! ```text
//! volume v1-client-0
//!     type protocol/client
//!     option remote-host srv1
//!     option remote-subvolume /bricks/brick0/v1_brick0
//! end-volume
//!
//! volume v1-replicate-0
//!     type cluster/replicate
//!     subvolumes v1-client-0 v1-client-1
//! end-volume
//! ```
use std::collections::BTreeMap;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{not_line_ending, space0, space1};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use crate::executor::RemoteExecutor;
use crate::shell_quote;

/// One translator of the graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Xlator {
    pub name: String,
    pub xl_type: String,
    pub options: BTreeMap<String, String>,
    pub subvolumes: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Statement<'a> {
    Volume(&'a str),
    Type(&'a str),
    Option(&'a str, &'a str),
    Subvolumes(Vec<&'a str>),
    End,
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn volume(input: &str) -> IResult<&str, Statement> {
    map(preceded(pair(tag("volume"), space1), word), Statement::Volume)(input)
}

fn xl_type(input: &str) -> IResult<&str, Statement> {
    map(preceded(pair(tag("type"), space1), word), Statement::Type)(input)
}

fn option(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            preceded(pair(tag("option"), space1), word),
            opt(preceded(space1, not_line_ending)),
        )),
        |(key, value): (&str, Option<&str>)| Statement::Option(key, value.unwrap_or("").trim()),
    )(input)
}

fn subvolumes(input: &str) -> IResult<&str, Statement> {
    map(
        preceded(pair(tag("subvolumes"), space1), separated_list1(space1, word)),
        Statement::Subvolumes,
    )(input)
}

fn end(input: &str) -> IResult<&str, Statement> {
    map(tag("end-volume"), |_| Statement::End)(input)
}

fn statement(input: &str) -> IResult<&str, Statement> {
    all_consuming(delimited(
        space0,
        alt((end, volume, xl_type, option, subvolumes)),
        space0,
    ))(input)
}

/// Parse a volfile into its translators, in file order.  Returns `None` on anything that
/// is not a well formed graph.
pub fn parse_volfile(text: &str) -> Option<Vec<Xlator>> {
    let mut xlators: Vec<Xlator> = Vec::new();
    let mut current: Option<Xlator> = None;
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let stmt = match statement(line) {
            Ok((_, s)) => s,
            Err(e) => {
                error!("volfile line {}: cannot parse {:?}: {:?}", lineno + 1, line, e);
                return None;
            }
        };
        match stmt {
            Statement::Volume(name) => {
                if let Some(ref open) = current {
                    error!(
                        "volfile line {}: translator {} opened inside {}",
                        lineno + 1,
                        name,
                        open.name
                    );
                    return None;
                }
                current = Some(Xlator {
                    name: name.to_string(),
                    ..Default::default()
                });
            }
            Statement::End => match current.take() {
                Some(xl) => xlators.push(xl),
                None => {
                    error!("volfile line {}: end-volume without volume", lineno + 1);
                    return None;
                }
            },
            other => {
                let xl = match current.as_mut() {
                    Some(xl) => xl,
                    None => {
                        error!("volfile line {}: {:?} outside a translator", lineno + 1, other);
                        return None;
                    }
                };
                match other {
                    Statement::Type(t) => xl.xl_type = t.to_string(),
                    Statement::Option(k, v) => {
                        xl.options.insert(k.to_string(), v.to_string());
                    }
                    Statement::Subvolumes(subs) => {
                        xl.subvolumes = subs.into_iter().map(|s| s.to_string()).collect()
                    }
                    Statement::Volume(_) | Statement::End => {}
                }
            }
        }
    }
    if let Some(xl) = current {
        error!("volfile ends inside translator {}", xl.name);
        return None;
    }
    Some(xlators)
}

pub fn find_xlator<'a>(xlators: &'a [Xlator], name: &str) -> Option<&'a Xlator> {
    xlators.iter().find(|x| x.name == name)
}

/// `(remote-host, remote-subvolume)` of a `protocol/client` translator
pub fn client_target(xl: &Xlator) -> Option<(String, String)> {
    if xl.xl_type != "protocol/client" {
        return None;
    }
    Some((
        xl.options.get("remote-host")?.clone(),
        xl.options.get("remote-subvolume")?.clone(),
    ))
}

/// Every brick a translator's subtree talks to, as `(host, path)` pairs in graph order
pub fn resolve_subvolume(xlators: &[Xlator], name: &str) -> Vec<(String, String)> {
    let mut targets = Vec::new();
    let mut stack = vec![name.to_string()];
    let mut guard = 0;
    while let Some(next) = stack.pop() {
        guard += 1;
        if guard > xlators.len() * 2 + 1 {
            error!("volfile graph below {} has a cycle", name);
            break;
        }
        let xl = match find_xlator(xlators, &next) {
            Some(x) => x,
            None => continue,
        };
        match client_target(xl) {
            Some(target) => targets.push(target),
            None => {
                for sub in xl.subvolumes.iter().rev() {
                    stack.push(sub.clone());
                }
            }
        }
    }
    targets
}

/// `host:/path` of every protocol/client translator
pub fn client_bricks(xlators: &[Xlator]) -> Vec<String> {
    xlators
        .iter()
        .filter_map(client_target)
        .map(|(host, path)| format!("{}:{}", host, path))
        .collect()
}

/// Read and parse the volfile at `path` on `node`
pub fn read_volfile(executor: &dyn RemoteExecutor, node: &str, path: &str) -> Option<Vec<Xlator>> {
    let cmd = format!("cat {}", shell_quote(path));
    match executor.run(node, &cmd) {
        Ok(output) => {
            if !output.success() {
                output.log_failure(node, &cmd);
                return None;
            }
            parse_volfile(&output.stdout)
        }
        Err(e) => {
            error!("Unable to read {} on {}: {}", path, node, e);
            None
        }
    }
}
