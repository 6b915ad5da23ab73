//! Text commands understood by the interactive client.
//!
//! ```text
//! ping
//! insert  <space> (<value>, ...)
//! replace <space> (<value>, ...)
//! select  <space> <key> [, <key>]* [offset <n>] [limit <n>]
//! delete  <space> <key>
//! update  <space> <key> <op> [, <op>]*
//!
//! <op> := set <field> = <value> | add <field> <n> | and <field> <n>
//!       | or <field> <n> | xor <field> <n>
//!       | splice <field> <offset> <length> <value> | delete <field>
//! ```
//!
//! Integer values become 4 byte little endian fields, quoted strings become
//! their UTF-8 bytes.

use std::iter::Peekable;
use std::str::Chars;

use anyhow::{anyhow, Result};

use crate::{
    common::{Flags, SpaceID},
    protocol::Request,
    tuple::Tuple,
    update::{ArithOp, Operation},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Keyword(Keyword),
    Integer(i64),
    String(String),
    Comma,
    LeftParen,
    RightParen,
    Equal,
    EOF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Ping,
    Insert,
    Replace,
    Select,
    Delete,
    Update,
    Offset,
    Limit,
    Set,
    Add,
    And,
    Or,
    Xor,
    Splice,
}
impl TryFrom<&str> for Keyword {
    type Error = anyhow::Error;
    fn try_from(s: &str) -> Result<Self> {
        match &*s.to_uppercase() {
            "PING" => Ok(Keyword::Ping),
            "INSERT" => Ok(Keyword::Insert),
            "REPLACE" => Ok(Keyword::Replace),
            "SELECT" => Ok(Keyword::Select),
            "DELETE" => Ok(Keyword::Delete),
            "UPDATE" => Ok(Keyword::Update),
            "OFFSET" => Ok(Keyword::Offset),
            "LIMIT" => Ok(Keyword::Limit),
            "SET" => Ok(Keyword::Set),
            "ADD" => Ok(Keyword::Add),
            "AND" => Ok(Keyword::And),
            "OR" => Ok(Keyword::Or),
            "XOR" => Ok(Keyword::Xor),
            "SPLICE" => Ok(Keyword::Splice),
            _ => Err(anyhow!("invalid keyword: {}", s)),
        }
    }
}

pub fn tokenize(iter: &mut Peekable<Chars>) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    loop {
        match iter.peek() {
            Some(c) if c.is_whitespace() => {
                iter.next();
            }
            Some(c) if c.is_alphabetic() => {
                let mut word = String::new();
                while let Some(c) = iter.next_if(|c| c.is_alphanumeric() || *c == '_') {
                    word.push(c);
                }
                tokens.push(Token::Keyword(Keyword::try_from(&*word)?));
            }
            Some(c) if c.is_ascii_digit() || *c == '-' => {
                let mut number = String::new();
                if let Some(sign) = iter.next_if_eq(&'-') {
                    number.push(sign);
                }
                while let Some(c) = iter.next_if(|c| c.is_ascii_digit()) {
                    number.push(c);
                }
                let value = number
                    .parse::<i64>()
                    .map_err(|_| anyhow!("invalid number: {}", number))?;
                tokens.push(Token::Integer(value));
            }
            Some(',') | Some('(') | Some(')') | Some('=') => {
                tokens.push(match iter.next() {
                    Some(',') => Token::Comma,
                    Some('(') => Token::LeftParen,
                    Some(')') => Token::RightParen,
                    _ => Token::Equal,
                });
            }
            Some('\'') => {
                let mut ret = String::new();
                iter.next();
                loop {
                    match iter.next() {
                        Some('\'') => break,
                        Some('\\') => match iter.next() {
                            Some(c) if c == '\'' || c == '\\' => ret.push(c),
                            _ => return Err(anyhow!("invalid string literal: {}", ret)),
                        },
                        Some(c) => ret.push(c),
                        None => return Err(anyhow!("unterminated string literal: {}", ret)),
                    }
                }
                tokens.push(Token::String(ret));
            }
            Some(c) => return Err(anyhow!("invalid token: {}", c)),
            None => {
                tokens.push(Token::EOF);
                break;
            }
        }
    }
    Ok(tokens)
}

/// Turns one line of input into the request it describes. Every mutating
/// request asks for the resulting tuple back.
pub fn parse_command(input: &str) -> Result<Request> {
    let mut iter = input.chars().peekable();
    let tokens = tokenize(&mut iter)?;
    let mut parser = CommandParser::new(tokens);
    parser.parse()
}

pub struct CommandParser {
    tokens: Vec<Token>,
    position: usize,
}

impl CommandParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        CommandParser {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Request> {
        let request = self.command()?;
        self.consume_token_or_error(Token::EOF)?;
        Ok(request)
    }

    fn command(&mut self) -> Result<Request> {
        let Token::Keyword(keyword) = self.peek().clone() else {
            return Err(anyhow!("expected a command"));
        };
        self.position += 1;
        match keyword {
            Keyword::Ping => Ok(Request::Ping),
            Keyword::Insert | Keyword::Replace => {
                let space_id = self.space_id()?;
                let tuple = self.tuple()?;
                let mut flags = Flags::RETURN_TUPLE;
                if keyword == Keyword::Insert {
                    flags |= Flags::ADD;
                }
                Ok(Request::Replace {
                    space_id,
                    flags: Flags(flags),
                    tuple,
                })
            }
            Keyword::Select => self.select(),
            Keyword::Delete => Ok(Request::Delete {
                space_id: self.space_id()?,
                flags: Flags(Flags::RETURN_TUPLE),
                key: self.key()?,
            }),
            Keyword::Update => self.update(),
            _ => Err(anyhow!("invalid command: {:?}", keyword)),
        }
    }

    fn select(&mut self) -> Result<Request> {
        let space_id = self.space_id()?;
        let mut keys = vec![self.key()?];
        while self.consume_token(Token::Comma) {
            keys.push(self.key()?);
        }
        let mut offset = 0;
        let mut limit = u32::MAX;
        loop {
            if self.consume_token(Token::Keyword(Keyword::Offset)) {
                offset = self.unsigned()?;
            } else if self.consume_token(Token::Keyword(Keyword::Limit)) {
                limit = self.unsigned()?;
            } else {
                break;
            }
        }
        Ok(Request::Select {
            space_id,
            index_no: 0,
            offset,
            limit,
            keys,
        })
    }

    fn update(&mut self) -> Result<Request> {
        let space_id = self.space_id()?;
        let key = self.key()?;
        let mut operations = vec![self.operation()?];
        while self.consume_token(Token::Comma) {
            operations.push(self.operation()?);
        }
        let mut ops = vec![];
        for operation in &operations {
            operation.serialize(&mut ops);
        }
        Ok(Request::Update {
            space_id,
            flags: Flags(Flags::RETURN_TUPLE),
            key,
            op_count: operations.len() as u32,
            ops,
        })
    }

    fn operation(&mut self) -> Result<Operation> {
        let Token::Keyword(keyword) = self.peek().clone() else {
            return Err(anyhow!("expected an update operation"));
        };
        self.position += 1;
        let field_no = self.unsigned()?;
        let operation = match keyword {
            Keyword::Set => {
                self.consume_token_or_error(Token::Equal)?;
                Operation::set(field_no, self.value()?)
            }
            Keyword::Add => Operation::arith(field_no, ArithOp::Add, self.integer()?),
            Keyword::And => Operation::arith(field_no, ArithOp::And, self.integer()?),
            Keyword::Or => Operation::arith(field_no, ArithOp::Or, self.integer()?),
            Keyword::Xor => Operation::arith(field_no, ArithOp::Xor, self.integer()?),
            Keyword::Splice => {
                let offset = self.integer()?;
                let length = self.integer()?;
                Operation::splice(field_no, offset, length, self.value()?)
            }
            Keyword::Delete => Operation::delete(field_no),
            _ => return Err(anyhow!("invalid update operation: {:?}", keyword)),
        };
        Ok(operation)
    }

    fn tuple(&mut self) -> Result<Tuple> {
        self.consume_token_or_error(Token::LeftParen)?;
        let mut tuple = Tuple::new();
        if self.consume_token(Token::RightParen) {
            return Ok(tuple);
        }
        loop {
            tuple.push(self.value()?);
            if !self.consume_token(Token::Comma) {
                break;
            }
        }
        self.consume_token_or_error(Token::RightParen)?;
        Ok(tuple)
    }

    fn key(&mut self) -> Result<Tuple> {
        Ok(Tuple::from(vec![self.value()?]))
    }

    fn value(&mut self) -> Result<Vec<u8>> {
        match self.peek().clone() {
            Token::Integer(_) => Ok(self.integer()?.to_le_bytes().to_vec()),
            Token::String(s) => {
                self.position += 1;
                Ok(s.into_bytes())
            }
            token => Err(anyhow!("invalid value: {:?}", token)),
        }
    }

    fn space_id(&mut self) -> Result<SpaceID> {
        Ok(SpaceID(self.unsigned()?))
    }

    fn integer(&mut self) -> Result<i32> {
        let Token::Integer(value) = self.peek().clone() else {
            return Err(anyhow!("expected an integer"));
        };
        self.position += 1;
        i32::try_from(value).map_err(|_| anyhow!("integer out of range: {}", value))
    }

    fn unsigned(&mut self) -> Result<u32> {
        let Token::Integer(value) = self.peek().clone() else {
            return Err(anyhow!("expected a number"));
        };
        self.position += 1;
        u32::try_from(value).map_err(|_| anyhow!("expected a non-negative number: {}", value))
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::EOF)
    }
    fn consume_token(&mut self, token: Token) -> bool {
        if *self.peek() == token {
            self.position += 1;
            true
        } else {
            false
        }
    }
    fn consume_token_or_error(&mut self, token: Token) -> Result<()> {
        if self.consume_token(token.clone()) {
            Ok(())
        } else {
            Err(anyhow!("expected {:?}, found {:?}", token, self.peek()))
        }
    }
}
