/*!
  The human readable textual form of a program is called assembly. This module turns assembly
  text into numbered token lines and classifies the tokens of a line, leaving symbol resolution
  to `crate::assembler`.

  Tokens are separated by spaces or tabs. A `;` outside a string starts a comment running to the
  end of the line. A double-quoted string is one token even if it contains spaces.
*/

use std::str::FromStr;

use nom::{
  IResult,
  branch::alt,
  bytes::complete::{is_not, tag, take_while1},
  character::complete::{char as one_char, digit1, hex_digit1, space0},
  combinator::{all_consuming, map, map_res, opt, recognize, rest},
  multi::many0,
  sequence::{delimited, pair, preceded, terminated},
};

use crate::address::Word;
use crate::error::AssemblyError;
use crate::register::Register;

/// One line of source after comments are stripped and the line is split into tokens.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SourceLine {
  /// Counts from 1.
  pub number : usize,
  pub tokens : Vec<String>,
}

impl SourceLine {
  pub fn new(number: usize, tokens: &[&str]) -> SourceLine {
    SourceLine {
      number,
      tokens: tokens.iter().map(|t| t.to_string()).collect(),
    }
  }
}

/// The syntactic form of a source line.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Statement<'a> {
  /// `name = value`
  Constant { name: &'a str, value: &'a str },
  /// `name:`
  Subroutine(&'a str),
  /// `&name`
  Label(&'a str),
  /// `mnemonic operand*`
  Instruction { mnemonic: &'a str, operands: &'a [String] },
}

/// An operand token, classified by its syntax.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Operand<'a> {
  /// A hex or decimal literal, already two's-complement encoded.
  Literal(Word),
  /// `&name`, resolved after the whole subroutine is seen
  Label(&'a str),
  /// `[name]`
  Constant(&'a str),
  /// `{name}`
  Subroutine(&'a str),
  Register(Register),
}

// region Tokenizer

fn quoted_p(input: &str) -> IResult<&str, &str> {
  recognize(delimited(one_char('"'), opt(is_not("\"")), one_char('"')))(input)
}

fn bare_p(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| !c.is_whitespace() && c != ';')(input)
}

fn comment_p(input: &str) -> IResult<&str, &str> {
  preceded(one_char(';'), rest)(input)
}

fn line_p(input: &str) -> IResult<&str, Vec<&str>> {
  all_consuming(
    terminated(
      many0(preceded(space0, alt((quoted_p, bare_p)))),
      pair(space0, opt(comment_p))
    )
  )(input)
}

/// Splits one line of text into tokens.
pub fn tokenize_line(number: usize, text: &str) -> Result<SourceLine, AssemblyError> {
  match line_p(text) {
    Ok((_rest, tokens)) => Ok(SourceLine::new(number, &tokens)),
    Err(_e) => Err(AssemblyError::Syntax{ line: number, text: text.to_string() })
  }
}

/// Splits text into numbered token lines. Lines with no tokens are dropped.
pub fn tokenize(text: &str) -> Result<Vec<SourceLine>, AssemblyError> {
  let mut lines = Vec::new();
  for (index, text) in text.lines().enumerate() {
    let line = tokenize_line(index + 1, text)?;
    if !line.tokens.is_empty() {
      lines.push(line);
    }
  }
  Ok(lines)
}

// endregion

// region Statements

pub fn is_symbol_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn symbol_p(input: &str) -> IResult<&str, &str> {
  take_while1(is_symbol_char)(input)
}

/// Checks that `token` is entirely a symbol name.
pub fn parse_name(line: usize, token: &str) -> Result<&str, AssemblyError> {
  match all_consuming(symbol_p)(token) {
    Ok((_, name)) => Ok(name),
    Err(_e) => Err(AssemblyError::InvalidName{ line, token: token.to_string() })
  }
}

/**
  Determines what kind of statement a line is. The checks are ordered: a constant declaration
  is recognised by its `=` before a subroutine declaration by its trailing `:`, and a label
  declaration by its leading `&`. Anything else is an instruction.
*/
pub fn classify_line(line: &SourceLine) -> Result<Statement<'_>, AssemblyError> {
  let tokens = &line.tokens;

  if tokens.is_empty() {
    return Err(AssemblyError::Syntax{ line: line.number, text: String::new() });
  }

  if tokens.len() >= 2 && tokens[1] == "=" {
    if tokens.len() != 3 {
      return Err(AssemblyError::InvalidConstantValue{
        line  : line.number,
        token : tokens[2..].join(" ")
      });
    }
    let name = parse_name(line.number, &tokens[0])?;
    return Ok(Statement::Constant{ name, value: &tokens[2] });
  }

  if tokens.len() == 1 {
    let token = tokens[0].as_str();
    if token.len() > 1 && token.ends_with(':') {
      let name = parse_name(line.number, &token[..token.len() - 1])?;
      return Ok(Statement::Subroutine(name));
    }
    if token.starts_with('&') {
      let name = parse_name(line.number, &token[1..])?;
      return Ok(Statement::Label(name));
    }
  }

  Ok(Statement::Instruction{ mnemonic: &tokens[0], operands: &tokens[1..] })
}

// endregion

// region Literals and operands

/// Converts a signed decimal value to a word, negative values in two's complement.
fn encode_integer(value: i64) -> Option<Word> {
  match value {
    v if v < 0 && v >= -(1 << 15) => Some((!((-v) as Word)).wrapping_add(1)),
    v if v >= 0 && v <= Word::max_value() as i64 => Some(v as Word),
    _ => None
  }
}

fn hex_p(input: &str) -> IResult<&str, Word> {
  map_res(
    preceded(tag("0x"), hex_digit1),
    |digits: &str| match digits.len() <= 4 {
      true  => Word::from_str_radix(digits, 16).map_err(|_| ()),
      false => Err(())
    }
  )(input)
}

fn decimal_p(input: &str) -> IResult<&str, Word> {
  map_res(
    recognize(pair(opt(one_char('-')), digit1)),
    |text: &str| {
      i64::from_str(text)
        .ok()
        .and_then(encode_integer)
        .ok_or(())
    }
  )(input)
}

fn operand_p(input: &str) -> IResult<&str, Operand<'_>> {
  all_consuming(
    alt((
      map(hex_p, Operand::Literal),
      map(preceded(one_char('&'), symbol_p), Operand::Label),
      map(delimited(one_char('['), symbol_p, one_char(']')), Operand::Constant),
      map(delimited(one_char('{'), symbol_p, one_char('}')), Operand::Subroutine),
      map(map_res(symbol_p, Register::from_str), Operand::Register),
      map(decimal_p, Operand::Literal),
    ))
  )(input)
}

/// Classifies an operand token. The precedence is hex, label, constant, subroutine, register,
/// decimal.
pub fn parse_operand(line: usize, token: &str) -> Result<Operand<'_>, AssemblyError> {
  match operand_p(token) {

    Ok((_, operand)) => Ok(operand),

    Err(_e) => {
      let token_string = token.to_string();
      if token.starts_with("0x") {
        Err(AssemblyError::InvalidHex{ line, token: token_string })
      } else if token.starts_with('-') || token.starts_with(|c: char| c.is_ascii_digit()) {
        Err(AssemblyError::InvalidInteger{ line, token: token_string })
      } else {
        Err(AssemblyError::UnknownOperand{ line, token: token_string })
      }
    }

  }
}

/// Parses the right hand side of `name = value` into the words it occupies.
pub fn parse_constant_value(line: usize, token: &str) -> Result<Vec<Word>, AssemblyError> {
  if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
    let mut words: Vec<Word> = token[1..token.len() - 1].encode_utf16().collect();
    words.push(0);
    return Ok(words);
  }

  if token.starts_with("0x") {
    return match all_consuming(hex_p)(token) {
      Ok((_, word)) => Ok(vec![word]),
      Err(_e) => Err(AssemblyError::InvalidHex{ line, token: token.to_string() })
    };
  }

  if token.starts_with('-') || token.starts_with(|c: char| c.is_ascii_digit()) {
    return match all_consuming(decimal_p)(token) {
      Ok((_, word)) => Ok(vec![word]),
      Err(_e) => Err(AssemblyError::InvalidInteger{ line, token: token.to_string() })
    };
  }

  Err(AssemblyError::InvalidConstantValue{ line, token: token.to_string() })
}

// endregion
