//! Thread-safe telemetry engine: collects per-turn traces and running
//! counters.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::*;

/// The core telemetry engine.
///
/// Thread-safe via `RwLock`. Shared by every conversation; holds only
/// observational data, never anything a run depends on.
pub struct TelemetryEngine {
    /// Recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    /// Running totals.
    totals: RwLock<UsageSnapshot>,
    /// Oldest completed traces are dropped beyond this many.
    max_traces: usize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::with_capacity(500)
    }

    pub fn with_capacity(max_traces: usize) -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            totals: RwLock::new(UsageSnapshot::default()),
            max_traces: max_traces.max(1),
        }
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a new trace for a turn segment. Returns its id.
    pub fn start_trace(&self, conversation_id: impl Into<String>) -> String {
        let trace = Trace::new(conversation_id);
        let id = trace.id.clone();
        let mut traces = write(&self.traces);

        if traces.len() >= self.max_traces {
            // Drop the oldest completed trace; open ones are still being written.
            if let Some(pos) = traces.iter().position(|t| t.ended_at.is_some()) {
                traces.remove(pos);
            }
        }

        traces.push(trace);
        write(&self.totals).trace_count += 1;
        id
    }

    /// End a trace with an outcome label.
    pub fn end_trace(&self, trace_id: &str, outcome: &str) {
        let mut traces = write(&self.traces);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end(outcome);
        }
    }

    /// Record a finished span and update running totals.
    pub fn record_span(&self, trace_id: &str, span: Span) {
        {
            let mut totals = write(&self.totals);
            match span.kind {
                SpanKind::Reasoning => totals.reasoning_calls += 1,
                SpanKind::ToolExecution => {
                    totals.tool_executions += 1;
                    if span.success == Some(false) {
                        totals.failed_tool_executions += 1;
                    }
                }
                SpanKind::Interrupt => totals.interrupts += 1,
                SpanKind::BudgetStop => totals.budget_stops += 1,
            }
        }

        let mut traces = write(&self.traces);
        match traces.iter_mut().find(|t| t.id == trace_id) {
            Some(trace) => trace.add_span(span),
            None => tracing::debug!(trace_id, "Span recorded for unknown trace"),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        read(&self.traces).iter().find(|t| t.id == trace_id).cloned()
    }

    /// Recent traces, most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        read(&self.traces).iter().rev().take(limit).cloned().collect()
    }

    /// Traces of one conversation, oldest first.
    pub fn traces_for_conversation(&self, conversation_id: &str) -> Vec<Trace> {
        read(&self.traces)
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn trace_count(&self) -> usize {
        read(&self.traces).len()
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        read(&self.totals).clone()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_end_trace() {
        let engine = TelemetryEngine::new();
        let trace_id = engine.start_trace("conv-1");
        assert_eq!(engine.trace_count(), 1);

        engine.end_trace(&trace_id, "suspended");
        let trace = engine.get_trace(&trace_id).unwrap();
        assert!(trace.ended_at.is_some());
        assert_eq!(trace.outcome.as_deref(), Some("suspended"));
    }

    #[test]
    fn record_span_updates_totals() {
        let engine = TelemetryEngine::new();
        let trace_id = engine.start_trace("conv-1");

        let mut ok = Span::new(SpanKind::ToolExecution, "get_weather");
        ok.end(true);
        let mut failed = Span::new(SpanKind::ToolExecution, "book_ticket");
        failed.end(false);
        engine.record_span(&trace_id, ok);
        engine.record_span(&trace_id, failed);
        engine.record_span(&trace_id, Span::new(SpanKind::Interrupt, "confirmation"));

        let snap = engine.usage_snapshot();
        assert_eq!(snap.tool_executions, 2);
        assert_eq!(snap.failed_tool_executions, 1);
        assert_eq!(snap.interrupts, 1);
        assert_eq!(engine.get_trace(&trace_id).unwrap().spans.len(), 3);
    }

    #[test]
    fn traces_filtered_by_conversation() {
        let engine = TelemetryEngine::new();
        engine.start_trace("a");
        engine.start_trace("b");
        engine.start_trace("a");
        assert_eq!(engine.traces_for_conversation("a").len(), 2);
        assert_eq!(engine.recent_traces(1)[0].conversation_id, "a");
    }

    #[test]
    fn capacity_drops_oldest_completed_trace() {
        let engine = TelemetryEngine::with_capacity(2);
        let first = engine.start_trace("a");
        engine.end_trace(&first, "completed");
        let second = engine.start_trace("b");
        engine.start_trace("c");

        assert_eq!(engine.trace_count(), 2);
        assert!(engine.get_trace(&first).is_none());
        assert!(engine.get_trace(&second).is_some());
    }
}
