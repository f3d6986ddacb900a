//! Evaluation of `if:` expressions on jobs and steps.
//!
//! Only the subset a local run can answer is understood: status functions,
//! string comparisons against the run context, `contains`/`startsWith`/
//! `endsWith`, and boolean operators. Anything else is reported as
//! unsupported and the caller decides what to do with it.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref EXPRESSION_WRAPPER: Regex = Regex::new(r"(?s)^\s*\$\{\{(.*)\}\}\s*$").unwrap();
}

const STATUS_FUNCTIONS: [&str; 4] = ["always", "success", "failure", "cancelled"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Run,
    Skip,
    Unsupported(String),
}

/// What an expression may refer to.
pub struct ExpressionContext<'a> {
    pub event_name: &'a str,
    pub git_ref: &'a str,
    pub job_id: &'a str,
    pub workflow: &'a str,
    pub env: &'a BTreeMap<String, String>,
    /// A prerequisite of the job was skipped, so `success()` is false.
    pub needs_skipped: bool,
}

/// An absent condition behaves like `success()`. An expression without any
/// status function is implicitly `success() && (expr)`.
pub fn evaluate(condition: Option<&str>, ctx: &ExpressionContext<'_>) -> ConditionOutcome {
    let Some(condition) = condition.map(str::trim).filter(|c| !c.is_empty()) else {
        return outcome(!ctx.needs_skipped);
    };

    let expression = unwrap_expression(condition);
    let value = parse(expression).and_then(|expr| {
        let value = expr.eval(ctx)?;
        Ok(if expr.uses_status_function() {
            value.truthy()
        } else {
            !ctx.needs_skipped && value.truthy()
        })
    });

    match value {
        Ok(run) => outcome(run),
        Err(_) if ctx.needs_skipped => ConditionOutcome::Skip,
        Err(reason) => ConditionOutcome::Unsupported(reason),
    }
}

/// Check that an expression can be evaluated at all, without a real run.
pub fn check(condition: &str) -> Result<(), String> {
    let env = BTreeMap::new();
    let ctx = ExpressionContext {
        event_name: "push",
        git_ref: "refs/heads/main",
        job_id: "",
        workflow: "",
        env: &env,
        needs_skipped: false,
    };
    parse(unwrap_expression(condition.trim()))?.eval(&ctx).map(|_| ())
}

fn outcome(run: bool) -> ConditionOutcome {
    if run {
        ConditionOutcome::Run
    } else {
        ConditionOutcome::Skip
    }
}

fn unwrap_expression(condition: &str) -> &str {
    EXPRESSION_WRAPPER
        .captures(condition)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(condition)
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn text(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Literal(String),
    Ident(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let pair = (c, chars.get(i + 1).copied());
        match pair {
            (c, _) if c.is_whitespace() => i += 1,
            ('(', _) => {
                tokens.push(Token::LParen);
                i += 1;
            }
            (')', _) => {
                tokens.push(Token::RParen);
                i += 1;
            }
            (',', _) => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ('&', Some('&')) => {
                tokens.push(Token::And);
                i += 2;
            }
            ('|', Some('|')) => {
                tokens.push(Token::Or);
                i += 2;
            }
            ('=', Some('=')) => {
                tokens.push(Token::Eq);
                i += 2;
            }
            ('!', Some('=')) => {
                tokens.push(Token::Ne);
                i += 2;
            }
            ('!', _) => {
                tokens.push(Token::Not);
                i += 1;
            }
            ('\'', _) => {
                // '' inside a literal is an escaped quote
                let mut literal = String::new();
                i += 1;
                loop {
                    match (chars.get(i), chars.get(i + 1)) {
                        (Some('\''), Some('\'')) => {
                            literal.push('\'');
                            i += 2;
                        }
                        (Some('\''), _) => {
                            i += 1;
                            break;
                        }
                        (Some(c), _) => {
                            literal.push(*c);
                            i += 1;
                        }
                        (None, _) => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            (c, _) if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '-' | '.'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            (c, _) => return Err(format!("unexpected character '{}'", c)),
        }
    }

    Ok(tokens)
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Context(String),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare { negate: bool, left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    fn uses_status_function(&self) -> bool {
        match self {
            Expr::Call(name, args) => {
                STATUS_FUNCTIONS.contains(&name.as_str())
                    || args.iter().any(Expr::uses_status_function)
            }
            Expr::Not(inner) => inner.uses_status_function(),
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.uses_status_function() || r.uses_status_function()
            }
            Expr::Compare { left, right, .. } => {
                left.uses_status_function() || right.uses_status_function()
            }
            Expr::Literal(_) | Expr::Context(_) => false,
        }
    }

    fn eval(&self, ctx: &ExpressionContext<'_>) -> Result<Value, String> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Context(path) => lookup(path, ctx),
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(ctx)?.truthy())),
            Expr::And(l, r) => {
                // Both sides are evaluated so unsupported parts are always reported.
                let left = l.eval(ctx)?;
                let right = r.eval(ctx)?;
                Ok(Value::Bool(left.truthy() && right.truthy()))
            }
            Expr::Or(l, r) => {
                let left = l.eval(ctx)?;
                let right = r.eval(ctx)?;
                Ok(Value::Bool(left.truthy() || right.truthy()))
            }
            Expr::Compare {
                negate,
                left,
                right,
            } => {
                let equal = left
                    .eval(ctx)?
                    .text()
                    .eq_ignore_ascii_case(&right.eval(ctx)?.text());
                Ok(Value::Bool(equal != *negate))
            }
            Expr::Call(name, args) => call(name, args, ctx),
        }
    }
}

fn call(name: &str, args: &[Expr], ctx: &ExpressionContext<'_>) -> Result<Value, String> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(format!(
                "{}() takes {} argument(s), got {}",
                name,
                expected,
                args.len()
            ))
        }
    };

    match name {
        "always" => arity(0).map(|_| Value::Bool(true)),
        "success" => arity(0).map(|_| Value::Bool(!ctx.needs_skipped)),
        // A failed job or step ends the run before anything else is evaluated.
        "failure" | "cancelled" => arity(0).map(|_| Value::Bool(false)),
        "contains" | "startsWith" | "endsWith" => {
            arity(2)?;
            let haystack = args[0].eval(ctx)?.text().to_lowercase();
            let needle = args[1].eval(ctx)?.text().to_lowercase();
            Ok(Value::Bool(match name {
                "contains" => haystack.contains(&needle),
                "startsWith" => haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            }))
        }
        other => Err(format!("unsupported function '{}'", other)),
    }
}

fn lookup(path: &str, ctx: &ExpressionContext<'_>) -> Result<Value, String> {
    let value = match path {
        "github.event_name" => ctx.event_name.to_string(),
        "github.ref" => ctx.git_ref.to_string(),
        "github.job" => ctx.job_id.to_string(),
        "github.workflow" => ctx.workflow.to_string(),
        "runner.os" => "Linux".to_string(),
        _ => match path.strip_prefix("env.") {
            Some(name) => ctx.env.get(name).cloned().unwrap_or_default(),
            None => return Err(format!("unsupported context '{}'", path)),
        },
    };
    Ok(Value::Str(value))
}

fn parse(input: &str) -> Result<Expr, String> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("unexpected token {:?}", token)),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            left = Expr::Or(Box::new(left), Box::new(self.parse_and()?));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            left = Expr::And(Box::new(left), Box::new(self.parse_equality()?));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let negate = if self.eat(&Token::Eq) {
                false
            } else if self.eat(&Token::Ne) {
                true
            } else {
                return Ok(left);
            };
            left = Expr::Compare {
                negate,
                left: Box::new(left),
                right: Box::new(self.parse_unary()?),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    Err("missing ')'".to_string())
                }
            }
            Some(Token::Literal(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Ident(word)) => {
                if word == "true" || word == "false" {
                    return Ok(Expr::Literal(Value::Bool(word == "true")));
                }
                if word.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
                    return Ok(Expr::Literal(Value::Str(word)));
                }
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Context(word));
                }

                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        if !self.eat(&Token::Comma) {
                            return Err(format!("expected ',' or ')' in call to {}", word));
                        }
                    }
                }
                Ok(Expr::Call(word, args))
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(condition: &str, env: &BTreeMap<String, String>, needs_skipped: bool) -> ConditionOutcome {
        let ctx = ExpressionContext {
            event_name: "push",
            git_ref: "refs/heads/main",
            job_id: "build",
            workflow: "CI",
            env,
            needs_skipped,
        };
        evaluate(Some(condition), &ctx)
    }

    fn eval(condition: &str) -> ConditionOutcome {
        eval_with(condition, &BTreeMap::new(), false)
    }

    #[test]
    fn test_absent_condition_runs_unless_a_need_was_skipped() {
        let env = BTreeMap::new();
        let mut ctx = ExpressionContext {
            event_name: "push",
            git_ref: "refs/heads/main",
            job_id: "build",
            workflow: "CI",
            env: &env,
            needs_skipped: false,
        };
        assert_eq!(evaluate(None, &ctx), ConditionOutcome::Run);
        assert_eq!(evaluate(Some("  "), &ctx), ConditionOutcome::Run);
        ctx.needs_skipped = true;
        assert_eq!(evaluate(None, &ctx), ConditionOutcome::Skip);
    }

    #[test]
    fn test_literals_and_status_functions() {
        assert_eq!(eval("true"), ConditionOutcome::Run);
        assert_eq!(eval("false"), ConditionOutcome::Skip);
        assert_eq!(eval("${{ false }}"), ConditionOutcome::Skip);
        assert_eq!(eval("always()"), ConditionOutcome::Run);
        assert_eq!(eval("success()"), ConditionOutcome::Run);
        assert_eq!(eval("failure()"), ConditionOutcome::Skip);
        assert_eq!(eval("cancelled()"), ConditionOutcome::Skip);
    }

    #[test]
    fn test_context_comparisons() {
        assert_eq!(eval("github.event_name == 'push'"), ConditionOutcome::Run);
        assert_eq!(eval("github.event_name == 'PUSH'"), ConditionOutcome::Run);
        assert_eq!(eval("github.event_name != 'push'"), ConditionOutcome::Skip);
        assert_eq!(
            eval("${{ github.ref == 'refs/heads/main' && github.job == 'build' }}"),
            ConditionOutcome::Run
        );
        assert_eq!(
            eval("github.event_name == 'pull_request' || runner.os == 'Linux'"),
            ConditionOutcome::Run
        );
        assert_eq!(eval("!(github.workflow == 'CI')"), ConditionOutcome::Skip);
    }

    #[test]
    fn test_env_and_string_functions() {
        let mut env = BTreeMap::new();
        env.insert("DEPLOY".to_string(), "yes".to_string());
        assert_eq!(eval_with("env.DEPLOY == 'yes'", &env, false), ConditionOutcome::Run);
        assert_eq!(eval_with("env.MISSING == ''", &env, false), ConditionOutcome::Run);
        assert_eq!(eval_with("env.MISSING", &env, false), ConditionOutcome::Skip);
        assert_eq!(
            eval("startsWith(github.ref, 'refs/heads/') && endsWith(github.ref, 'main')"),
            ConditionOutcome::Run
        );
        assert_eq!(eval("contains(github.ref, 'release')"), ConditionOutcome::Skip);
        assert_eq!(eval("contains('it''s', '''')"), ConditionOutcome::Run);
    }

    #[test]
    fn test_skipped_need_requires_always() {
        let env = BTreeMap::new();
        assert_eq!(eval_with("true", &env, true), ConditionOutcome::Skip);
        assert_eq!(eval_with("success()", &env, true), ConditionOutcome::Skip);
        assert_eq!(eval_with("always()", &env, true), ConditionOutcome::Run);
        assert_eq!(
            eval_with("always() && github.event_name == 'push'", &env, true),
            ConditionOutcome::Run
        );
    }

    #[test]
    fn test_unsupported_expressions() {
        assert!(matches!(
            eval("github.event.pull_request.merged == true"),
            ConditionOutcome::Unsupported(_)
        ));
        assert!(matches!(
            eval("hashFiles('**/Cargo.lock') != ''"),
            ConditionOutcome::Unsupported(_)
        ));
        assert!(matches!(eval("(true"), ConditionOutcome::Unsupported(_)));
        assert!(matches!(eval("'open"), ConditionOutcome::Unsupported(_)));
        assert!(matches!(eval("a > b"), ConditionOutcome::Unsupported(_)));
    }

    #[test]
    fn test_check() {
        assert!(check("${{ github.ref == 'refs/heads/main' }}").is_ok());
        assert!(check("always()").is_ok());
        let reason = check("matrix.os == 'linux'").unwrap_err();
        assert!(reason.contains("matrix.os"));
    }
}
