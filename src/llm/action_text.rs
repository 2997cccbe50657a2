//! Parser for free-text action replies
//!
//! GUI-agent models answer with lines such as
//! `Action: click(start_box='<|box_start|>(412,688)<|box_end|>')` instead of
//! tool calls. Coordinates are on a 0-1000 grid over the screenshot.

use crate::actions::{OperationKind, OperationParams, ScrollDirection};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_while1};
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::map_res;
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};

/// Side of the normalised coordinate grid
pub const GRID: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    pub kind: OperationKind,
    /// Parameters with coordinates still on the 0-1000 grid
    pub params: OperationParams,
}

impl ParsedAction {
    /// Map grid coordinates to pixels of a `width` x `height` image
    pub fn rescale(&self, width: u32, height: u32) -> ParsedAction {
        let sx = |v: i32| (v as f64 * width as f64 / GRID) as i32;
        let sy = |v: i32| (v as f64 * height as f64 / GRID) as i32;
        let params = match &self.params {
            OperationParams::Point { x, y } => OperationParams::Point { x: sx(*x), y: sy(*y) },
            OperationParams::Scroll { x, y, direction } => OperationParams::Scroll {
                x: sx(*x),
                y: sy(*y),
                direction: *direction,
            },
            OperationParams::Drag { x1, y1, x2, y2 } => OperationParams::Drag {
                x1: sx(*x1),
                y1: sy(*y1),
                x2: sx(*x2),
                y2: sy(*y2),
            },
            other => other.clone(),
        };
        ParsedAction {
            kind: self.kind,
            params,
        }
    }
}

fn action_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphabetic() || c == '_').parse(input)
}

/// `name(args)`; returns the name and the raw argument block
fn call(input: &str) -> IResult<&str, (&str, &str)> {
    let (rest, name) = action_name(input)?;
    let (rest, _) = (multispace0, char('(')).parse(rest)?;
    match rest.trim_end().strip_suffix(')') {
        Some(args) => Ok(("", (name, args))),
        None => Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Char,
        ))),
    }
}

/// Every unsigned integer in the argument block, in order
fn integers(input: &str) -> Vec<i32> {
    let number = map_res(digit1::<&str, nom::error::Error<&str>>, |d: &str| {
        d.parse::<i32>()
    });
    let mut scan = many0(preceded(take_till(|c: char| c.is_ascii_digit()), number));
    let scanned: IResult<&str, Vec<i32>> = scan.parse(input);
    scanned.map(|(_, v)| v).unwrap_or_default()
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_till(|c| c == '\''), char('\'')),
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
    ))
    .parse(input)
}

/// Value of `key='...'` inside an argument block
fn keyword<'a>(args: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("{}=", key);
    let start = args.find(&pattern)? + pattern.len();
    let value = &args[start..];
    preceded(multispace0, quoted)
        .parse(value)
        .ok()
        .map(|(_, v)| v)
}

/// Parse one action expression such as `click(start_box='(10,20)')`
pub fn parse_action(text: &str) -> Option<ParsedAction> {
    let (_, (name, args)) = call(text.trim()).ok()?;
    let nums = integers(args);
    let point = || match nums.as_slice() {
        [x, y, ..] => Some(OperationParams::Point { x: *x, y: *y }),
        _ => None,
    };

    let (kind, params) = match name.to_ascii_lowercase().as_str() {
        "click" | "left_single" => (OperationKind::Click, point()?),
        "right_single" | "right_single_click" => (OperationKind::RightSingle, point()?),
        "left_double" | "double_click" => (OperationKind::LeftDouble, point()?),
        "long_press" => (OperationKind::LongPress, point()?),
        "drag" => match nums.as_slice() {
            [x1, y1, x2, y2, ..] => (
                OperationKind::Drag,
                OperationParams::Drag {
                    x1: *x1,
                    y1: *y1,
                    x2: *x2,
                    y2: *y2,
                },
            ),
            _ => return None,
        },
        "scroll" => {
            let direction = match keyword(args, "direction") {
                Some(d) if d.eq_ignore_ascii_case("up") => ScrollDirection::Up,
                _ => ScrollDirection::Down,
            };
            match nums.as_slice() {
                [x, y, ..] => (
                    OperationKind::Scroll,
                    OperationParams::Scroll {
                        x: *x,
                        y: *y,
                        direction,
                    },
                ),
                _ => return None,
            }
        }
        "type" => (
            OperationKind::Type,
            OperationParams::Text {
                content: keyword(args, "content")?.to_string(),
            },
        ),
        "hotkey" => (
            OperationKind::Hotkey,
            OperationParams::Key {
                key: keyword(args, "key")?.to_string(),
            },
        ),
        "press_enter" => (OperationKind::PressEnter, OperationParams::Empty {}),
        "press_back" => (OperationKind::PressBack, OperationParams::Empty {}),
        "press_home" => (OperationKind::PressHome, OperationParams::Empty {}),
        "wait" => (OperationKind::Wait, OperationParams::Empty {}),
        "finished" => (OperationKind::Finished, OperationParams::Empty {}),
        "call_user" => (OperationKind::CallUser, OperationParams::Empty {}),
        _ => return None,
    };
    Some(ParsedAction { kind, params })
}

fn action_line(line: &str) -> Option<&str> {
    let parsed: IResult<&str, &str> = preceded(multispace0, tag("Action:")).parse(line);
    parsed.ok().map(|(rest, _)| rest.trim())
}

/// First parseable `Action:` line of a reply
pub fn parse_reply(text: &str) -> Option<ParsedAction> {
    text.lines()
        .filter_map(action_line)
        .filter(|a| !a.is_empty())
        .find_map(parse_action)
}

/// Text after `Thought:` up to the action, if present
pub fn thought(text: &str) -> Option<String> {
    let start = text.find("Thought:")? + "Thought:".len();
    let rest = &text[start..];
    let end = rest.find("\nAction:").unwrap_or(rest.len());
    let thought = rest[..end].trim();
    (!thought.is_empty()).then(|| thought.to_string())
}
