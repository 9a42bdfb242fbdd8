//! Bounded per-iteration context
//!
//! The memory provider turns a trajectory into a bounded context: the system
//! anchor verbatim, a compressed digest of the far field, and the most
//! recent steps verbatim. Providers are synchronous and deterministic; the
//! loop consumes one context per iteration.

use crate::trajectory::{Step, Trajectory};

/// Bounded context for one iteration.
#[derive(Debug, Clone)]
pub struct Context {
    /// Always present, never evicted.
    pub system_anchor: String,
    /// Compressed digest of evicted history, if any.
    pub summary: Option<String>,
    /// Recent steps, rendered verbatim in step order.
    pub recent: Vec<String>,
}

impl Context {
    /// Context carrying only the system anchor.
    pub fn anchored(anchor: impl Into<String>) -> Self {
        Self {
            system_anchor: anchor.into(),
            summary: None,
            recent: Vec::new(),
        }
    }

    /// Render the context as prompt text: anchor, then summary, then the
    /// verbatim recent steps.
    pub fn render(&self) -> String {
        let mut out = self.system_anchor.clone();
        if let Some(summary) = &self.summary {
            out.push_str("\n\n[history digest]\n");
            out.push_str(summary);
        }
        if !self.recent.is_empty() {
            out.push_str("\n\n[recent steps]\n");
            out.push_str(&self.recent.join("\n\n"));
        }
        out
    }
}

/// Produces the bounded context for each iteration.
pub trait MemoryProvider: Send + Sync {
    fn context(&self, trajectory: &Trajectory) -> Context;
}

/// Rough token estimate: characters divided by 2.5.
pub(crate) fn approx_tokens(text: &str) -> usize {
    (text.len() as f64 / 2.5) as usize
}

fn render_step(step: &Step) -> String {
    let mut out = format!("Thought: {}\nAction: {}", step.thought, step.action);
    if let Some(obs) = &step.observation {
        out.push_str(&format!("\nObservation: {obs}"));
    }
    out
}

fn digest_step(index: usize, step: &Step) -> String {
    const DIGEST_CHARS: usize = 100;
    let outcome = step
        .observation
        .as_ref()
        .map(|obs| {
            let text = obs.to_string();
            match text.char_indices().nth(DIGEST_CHARS) {
                Some((byte, _)) => format!("{}...", &text[..byte]),
                None => text,
            }
        })
        .unwrap_or_else(|| "(no observation)".to_string());
    format!("step {}: {} -> {}", index + 1, step.action, outcome)
}

/// Default memory provider: near field kept verbatim, far field folded into
/// a one-line-per-step digest, all under an approximate token budget with a
/// 20% reserve. The system anchor is always retained.
pub struct WindowMemory {
    system_anchor: String,
    max_context_tokens: usize,
    near_field_steps: usize,
}

impl WindowMemory {
    pub fn new(system_anchor: impl Into<String>) -> Self {
        Self {
            system_anchor: system_anchor.into(),
            max_context_tokens: 32_768,
            near_field_steps: 4,
        }
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_near_field_steps(mut self, steps: usize) -> Self {
        self.near_field_steps = steps.max(1);
        self
    }

    fn budget(&self) -> usize {
        let reserve = self.max_context_tokens / 5 + approx_tokens(&self.system_anchor);
        self.max_context_tokens.saturating_sub(reserve)
    }
}

impl MemoryProvider for WindowMemory {
    fn context(&self, trajectory: &Trajectory) -> Context {
        let steps = trajectory.steps();
        let split = steps.len().saturating_sub(self.near_field_steps);
        let (far, near) = steps.split_at(split);

        let mut recent: Vec<String> = near.iter().map(render_step).collect();
        let mut summary_lines: Vec<String> = far
            .iter()
            .enumerate()
            .map(|(i, step)| digest_step(i, step))
            .collect();

        let budget = self.budget();
        let used = |recent: &[String], summary: &[String]| {
            recent.iter().map(|s| approx_tokens(s)).sum::<usize>()
                + summary.iter().map(|s| approx_tokens(s)).sum::<usize>()
        };

        // Evict oldest digest lines first, then oldest verbatim steps. The
        // newest step always survives.
        while used(&recent, &summary_lines) > budget && !summary_lines.is_empty() {
            summary_lines.remove(0);
        }
        while used(&recent, &summary_lines) > budget && recent.len() > 1 {
            recent.remove(0);
        }

        let summary = if summary_lines.is_empty() {
            None
        } else {
            Some(summary_lines.join("\n"))
        };

        Context {
            system_anchor: self.system_anchor.clone(),
            summary,
            recent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{Action, Observation};
    use pretty_assertions::assert_eq;

    const ANCHOR: &str = "anchor text";

    fn step(n: usize) -> Step {
        Step {
            thought: format!("thinking about part {n}").into(),
            action: Action::call("search_docs", serde_json::json!({ "query": n })),
            observation: Some(Observation::ToolResult(format!("fragment {n}"))),
        }
    }

    fn trajectory(len: usize) -> Trajectory {
        let mut t = Trajectory::new();
        for n in 0..len {
            t.push(step(n));
        }
        t
    }

    #[test]
    fn test_anchor_always_present() {
        let memory = WindowMemory::new(ANCHOR).with_max_context_tokens(64);
        let context = memory.context(&trajectory(20));

        assert_eq!(context.system_anchor, ANCHOR);
        assert!(context.render().starts_with(ANCHOR));
    }

    #[test]
    fn test_near_field_kept_verbatim_far_field_digested() {
        let memory = WindowMemory::new(ANCHOR).with_near_field_steps(2);
        let context = memory.context(&trajectory(5));

        assert_eq!(context.recent.len(), 2);
        assert!(context.recent[0].contains("thinking about part 3"));
        assert!(context.recent[1].contains("thinking about part 4"));

        let summary = context.summary.expect("far field should be digested");
        assert!(summary.contains("step 1:"));
        assert!(summary.contains("step 3:"));
        assert!(!summary.contains("step 4:"));
    }

    #[test]
    fn test_tight_budget_drops_oldest_but_keeps_newest_step() {
        let memory = WindowMemory::new(ANCHOR)
            .with_near_field_steps(4)
            .with_max_context_tokens(80);
        let context = memory.context(&trajectory(10));

        assert_eq!(context.summary, None);
        assert_eq!(context.recent.len(), 1);
        assert!(context.recent[0].contains("thinking about part 9"));
    }

    #[test]
    fn test_empty_trajectory_is_anchor_only() {
        let memory = WindowMemory::new(ANCHOR);
        let context = memory.context(&Trajectory::new());

        assert_eq!(context.summary, None);
        assert!(context.recent.is_empty());
        assert_eq!(context.render(), ANCHOR);
    }
}
