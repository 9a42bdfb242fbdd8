//! Builtin tools
//!
//! `CalculatorTool` covers the high-frequency arithmetic path; `FnTool`
//! adapts a host-supplied async closure (e.g. a `search_docs` handler backed
//! by the external chunker) into a registered tool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{Tool, DEFAULT_TOOL_TIMEOUT};

// =============================================================================
// FnTool
// =============================================================================

type BoxedHandler = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<String>> + Send>>
        + Send
        + Sync,
>;

/// A tool built from an async closure.
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    timeout: Duration,
    handler: BoxedHandler,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
            handler: Arc::new(move |input| Box::pin(handler(input))),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call(&self, input: serde_json::Value) -> Result<String> {
        (self.handler)(input).await
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Arithmetic over `+ - * / %` with parentheses and unary minus.
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+, -, *, /, %, parentheses)"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["expr"],
            "properties": {
                "expr": { "type": "string", "description": "Expression to evaluate" }
            }
        })
    }

    async fn call(&self, input: serde_json::Value) -> Result<String> {
        let expr = input
            .get("expr")
            .and_then(|v| v.as_str())
            .or_else(|| input.as_str())
            .ok_or_else(|| anyhow!("calculator expects {{\"expr\": \"...\"}}"))?;
        let value = eval(expr)?;
        Ok(format_number(value))
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn eval(expr: &str) -> Result<f64> {
    let mut parser = Parser {
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };
    let value = parser.expression()?;
    if parser.pos != parser.chars.len() {
        bail!("unexpected character '{}' in expression", parser.chars[parser.pos]);
    }
    Ok(value)
}

/// Recursive-descent parser: expression -> term -> factor.
struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = match op {
                '*' => value * rhs,
                '/' => {
                    if rhs == 0.0 {
                        bail!("division by zero");
                    }
                    value / rhs
                }
                _ => {
                    if rhs == 0.0 {
                        bail!("modulo by zero");
                    }
                    value % rhs
                }
            };
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(')') {
                    bail!("missing closing parenthesis");
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => bail!("unexpected character '{c}' in expression"),
            None => bail!("expression ended unexpectedly"),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map_err(|_| anyhow!("invalid number '{text}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn calc(expr: &str) -> Result<String> {
        CalculatorTool
            .call(serde_json::json!({ "expr": expr }))
            .await
    }

    #[tokio::test]
    async fn test_basic_arithmetic() {
        assert_eq!(calc("2+3").await.unwrap(), "5");
        assert_eq!(calc("2 + 3 * 4").await.unwrap(), "14");
        assert_eq!(calc("(2 + 3) * 4").await.unwrap(), "20");
        assert_eq!(calc("-3 + 10").await.unwrap(), "7");
        assert_eq!(calc("10 % 4").await.unwrap(), "2");
        assert_eq!(calc("7 / 2").await.unwrap(), "3.5");
    }

    #[tokio::test]
    async fn test_division_by_zero_is_an_error() {
        let err = calc("1/0").await.unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn test_malformed_expression_is_an_error() {
        assert!(calc("2 +").await.is_err());
        assert!(calc("(2 + 3").await.is_err());
        assert!(calc("two plus two").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_expr_field_is_an_error() {
        let err = CalculatorTool
            .call(serde_json::json!({ "expression": "2+2" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expr"));
    }

    #[tokio::test]
    async fn test_fn_tool_adapts_a_closure() {
        let tool = FnTool::new("echo", |input: serde_json::Value| async move {
            Ok(input["text"].as_str().unwrap_or("").to_string())
        });

        let out = tool.call(serde_json::json!({ "text": "hi" })).await.unwrap();
        assert_eq!(out, "hi");
        assert_eq!(tool.name(), "echo");
    }
}
