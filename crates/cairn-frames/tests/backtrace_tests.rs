//! Frame summaries and whole-stack backtraces

mod common;

use cairn_frames::{FrameError, FrameKind};
use common::{Fixture, F, G, MAIN, SIGTRAMP, START};
use pretty_assertions::assert_eq;

fn render(fx: &mut Fixture) -> String {
    fx.frames
        .backtrace()
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_backtrace_stops_at_main() {
    let mut fx = Fixture::standard();
    insta::assert_snapshot!(render(&mut fx), @r###"
    {level=0,type=NORMAL_FRAME,unwind=table,pc=0x1010,id={stack=0x7000,code=0x1000,!special},func=0x1000}
    {level=1,type=NORMAL_FRAME,unwind=table,pc=0x2020,id={stack=0x7010,code=0x2000,!special},func=0x2000}
    {level=2,type=NORMAL_FRAME,unwind=table,pc=0x3030,id={stack=0x7030,code=0x3000,!special},func=0x3000}
    "###);
}

#[test]
fn test_backtrace_past_main_reaches_outermost() {
    let mut fx = Fixture::standard();
    fx.frames.set_past_main(true);
    let summaries = fx.frames.backtrace().unwrap();
    assert_eq!(summaries.len(), 4);
    let outermost = &summaries[3];
    assert_eq!(outermost.level, 3);
    assert_eq!(outermost.func, Some(START));
    assert_eq!(outermost.pc, Some(START + 0x8));
    assert!(!outermost.id.unwrap().is_valid());
}

#[test]
fn test_backtrace_through_signal_trampoline() {
    let mut fx = Fixture::new(&[F + 0x10, SIGTRAMP + 0x10, G + 0x20, MAIN + 0x30, START + 0x8]);
    let summaries = fx.frames.backtrace().unwrap();
    let kinds: Vec<_> = summaries.iter().map(|s| s.kind.unwrap()).collect();
    assert_eq!(
        kinds,
        vec![
            FrameKind::Normal,
            FrameKind::SignalTrampoline,
            FrameKind::Normal,
            FrameKind::Normal,
        ]
    );
    assert_eq!(summaries[1].unwinder.as_deref(), Some("sigtramp"));
    assert_eq!(summaries[3].func, Some(MAIN));
}

#[test]
fn test_backtrace_limit_is_an_error() {
    let mut fx = Fixture::standard();
    fx.frames.set_backtrace_limit(Some(1));
    assert_eq!(
        fx.frames.backtrace().unwrap_err(),
        FrameError::BacktraceLimitExceeded { limit: 1 }
    );
}

#[test]
fn test_snapshot_does_not_unwind() {
    let mut fx = Fixture::standard();
    let current = fx.frames.current_frame().unwrap();
    let analyses = fx.analyses.get();

    let summary = fx.frames.snapshot_frame(current).unwrap();
    assert_eq!(
        summary.to_string(),
        "{level=0,type=<unknown>,unwind=<unknown>,pc=<unknown>,id=<unknown>,func=<unknown>}"
    );
    assert_eq!(fx.analyses.get(), analyses);
    assert_eq!(fx.unwinder.id_calls.get(), 0);
}

#[test]
fn test_snapshot_shows_computed_fields() {
    let mut fx = Fixture::standard();
    let current = fx.frames.current_frame().unwrap();
    fx.frames.frame_pc(current).unwrap();

    let summary = fx.frames.snapshot_frame(current).unwrap();
    assert_eq!(summary.pc, Some(F + 0x10));
    assert_eq!(summary.kind, None);
    assert!(summary.id.is_none());
}

#[test]
fn test_summary_serializes() {
    let mut fx = Fixture::standard();
    let current = fx.frames.current_frame().unwrap();
    let summary = fx.frames.describe_frame(current).unwrap();
    assert_eq!(
        serde_json::to_string(&summary).unwrap(),
        r#"{"level":0,"kind":"Normal","unwinder":"table","pc":4112,"id":{"stack_addr":28672,"code_addr":4096,"special_addr":null},"func":4096}"#
    );
}
