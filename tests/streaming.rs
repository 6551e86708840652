//! Streaming reply pipeline tests

use std::sync::Arc;
use std::time::Duration;

use avatar_relay::delivery::{ProsodyOverrides, StyleId};
use avatar_relay::history::Conversation;
use avatar_relay::llm::StreamingModel;
use avatar_relay::stream::{
    EMPTY_REPLY, FallbackReason, ReplyRequest, StreamOrchestrator, StreamingResult,
    UNREACHABLE_REPLY, Voice,
};

mod common;
use common::{FakeSynthesizer, Script, ScriptedStream, conversation};

const DEADLINE: Duration = Duration::from_secs(5);

fn request(user_text: &str) -> ReplyRequest<'_> {
    ReplyRequest {
        engine: "local",
        user_text,
        extra_rules: "",
        voice: Voice::default(),
    }
}

async fn run(
    model: &dyn StreamingModel,
    synthesizer: &Arc<FakeSynthesizer>,
    conversation: &Conversation,
) -> StreamingResult {
    let orchestrator = StreamOrchestrator::new(synthesizer.clone(), DEADLINE);
    orchestrator
        .stream_reply(model, conversation, request("こんにちは"))
        .await
}

#[tokio::test]
async fn sentences_are_synthesized_in_order() {
    let model = ScriptedStream::tokens(&["こん", "にちは。", "元気", "?"]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts(), vec!["こんにちは。", "元気?"]);
    assert_eq!(result.full_text, "こんにちは。元気?");
    assert_eq!(result.audio_urls(), vec!["/audio/reply_1.wav", "/audio/reply_2.wav"]);
    assert_eq!(result.fallback_reason, None);
}

#[tokio::test]
async fn first_sentence_is_synthesized_before_stream_ends() {
    let model = ScriptedStream::new(vec![
        Script::Token("こん"),
        Script::Token("にちは。"),
        Script::Token("元気"),
        Script::Hang,
    ]);
    let synth = FakeSynthesizer::ok();
    let orchestrator = StreamOrchestrator::new(synth.clone(), Duration::from_millis(400));
    let conversation = conversation();

    let (result, seen_mid_stream) = tokio::join!(
        orchestrator.stream_reply(model.as_ref(), &conversation, request("こんにちは")),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            synth.texts()
        },
    );

    assert_eq!(seen_mid_stream, vec!["こんにちは。"]);
    assert_eq!(synth.texts(), vec!["こんにちは。", "元気"]);
    assert_eq!(result.full_text, "こんにちは。元気");
}

#[tokio::test]
async fn no_terminator_means_one_flush() {
    let model = ScriptedStream::tokens(&["ねえ", "聞いて", " "]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts(), vec!["ねえ聞いて"]);
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.fallback_reason, None);
}

#[tokio::test]
async fn two_terminators_make_at_most_three_segments() {
    let model = ScriptedStream::tokens(&["First. Sec", "ond! and the", " rest"]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts(), vec!["First.", "Second!", "and the rest"]);
    assert!(result.artifacts.len() <= 3);
}

#[tokio::test]
async fn many_sentences_pass_through_bounded_channel_in_order() {
    let tokens: Vec<&'static str> = (0..30).map(|_| "あ。").collect();
    let model = ScriptedStream::tokens(&tokens);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(result.artifacts.len(), 30);
    let names: Vec<String> = result.artifacts.iter().map(|a| a.filename.clone()).collect();
    let expected: Vec<String> = (1..=30).map(|i| format!("reply_{i}.wav")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn segment_failures_fall_back_to_whole_reply() {
    let model = ScriptedStream::tokens(&["こんにちは。", "元気?"]);
    let whole = "こんにちは。元気?";
    let synth = FakeSynthesizer::failing_when(Box::new(move |text| text != whole));

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts(), vec!["こんにちは。", "元気?", whole]);
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.fallback_reason, Some(FallbackReason::SegmentFail));
}

#[tokio::test]
async fn partial_segments_are_discarded_on_fallback() {
    let model = ScriptedStream::tokens(&["いい。", "だめ。", "いい。"]);
    let synth = FakeSynthesizer::failing_when(Box::new(|text| text == "だめ。"));

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.discarded(), vec!["reply_1.wav", "reply_3.wav"]);
    assert_eq!(synth.texts().last().map(String::as_str), Some("いい。だめ。いい。"));
    assert_eq!(result.audio_urls(), vec!["/audio/reply_4.wav"]);
    assert_eq!(result.fallback_reason, Some(FallbackReason::SegmentFail));
}

#[tokio::test]
async fn failed_fallback_leaves_no_audio() {
    let model = ScriptedStream::tokens(&["あ。", "い"]);
    let synth = FakeSynthesizer::always_failing();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts().len(), 3);
    assert!(result.artifacts.is_empty());
    assert_eq!(result.fallback_reason, Some(FallbackReason::SegmentFail));
}

#[tokio::test]
async fn unreachable_model_speaks_placeholder() {
    let model = ScriptedStream::unreachable();
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(result.full_text, UNREACHABLE_REPLY);
    assert_eq!(synth.texts(), vec![UNREACHABLE_REPLY]);
    assert_eq!(result.audio_urls(), vec!["/audio/reply_1.wav"]);
    assert_eq!(result.fallback_reason, Some(FallbackReason::NoAudio));
}

#[tokio::test]
async fn error_before_any_token_is_unreachable() {
    let model = ScriptedStream::new(vec![Script::Fail]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(result.full_text, UNREACHABLE_REPLY);
    assert_eq!(synth.texts(), vec![UNREACHABLE_REPLY]);
    assert_eq!(result.fallback_reason, Some(FallbackReason::NoAudio));
}

#[tokio::test]
async fn empty_reply_speaks_placeholder() {
    let model = ScriptedStream::new(vec![Script::Token("  "), Script::Done]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(result.full_text, EMPTY_REPLY);
    assert_eq!(synth.texts(), vec![EMPTY_REPLY]);
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.fallback_reason, Some(FallbackReason::NoAudio));
}

#[tokio::test]
async fn unspeakable_placeholder_leaves_no_audio() {
    let model = ScriptedStream::unreachable();
    let synth = FakeSynthesizer::always_failing();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts(), vec![UNREACHABLE_REPLY]);
    assert!(result.artifacts.is_empty());
    assert_eq!(result.fallback_reason, Some(FallbackReason::NoAudio));
}

#[tokio::test]
async fn done_mid_sentence_flushes_remainder() {
    let model = ScriptedStream::new(vec![
        Script::Token("ひとつ。ふた"),
        Script::Done,
        Script::Token("つ。"),
    ]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(synth.texts(), vec!["ひとつ。", "ふた"]);
    assert_eq!(result.full_text, "ひとつ。ふた");
}

#[tokio::test]
async fn mid_stream_error_keeps_text_and_flushes() {
    let model = ScriptedStream::new(vec![Script::Token("途中まで。あと"), Script::Fail]);
    let synth = FakeSynthesizer::ok();

    let result = run(model.as_ref(), &synth, &conversation()).await;

    assert_eq!(result.full_text, "途中まで。あと");
    assert_eq!(synth.texts(), vec!["途中まで。", "あと"]);
    assert_eq!(result.fallback_reason, None);
}

#[tokio::test]
async fn deadline_ends_a_stalled_stream() {
    let model = ScriptedStream::new(vec![Script::Token("止まった"), Script::Hang]);
    let synth = FakeSynthesizer::ok();
    let orchestrator = StreamOrchestrator::new(synth.clone(), Duration::from_millis(100));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.stream_reply(model.as_ref(), &conversation(), request("ねえ")),
    )
    .await
    .expect("deadline should end the stream");

    assert_eq!(result.full_text, "止まった");
    assert_eq!(synth.texts(), vec!["止まった"]);
}

#[tokio::test]
async fn voice_settings_reach_every_segment() {
    let model = ScriptedStream::tokens(&["一。", "二。"]);
    let synth = FakeSynthesizer::ok();
    let overrides = ProsodyOverrides {
        speed_scale: Some(1.2),
        ..ProsodyOverrides::default()
    };
    let orchestrator = StreamOrchestrator::new(synth.clone(), DEADLINE);

    orchestrator
        .stream_reply(
            model.as_ref(),
            &conversation(),
            ReplyRequest {
                voice: Voice {
                    style: StyleId::Whisper,
                    overrides: Some(overrides),
                },
                ..request("ないしょ")
            },
        )
        .await;

    let calls = synth.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert_eq!(call.style, StyleId::Whisper);
        assert_eq!(call.overrides, Some(overrides));
    }
}

#[tokio::test]
async fn exchange_is_recorded_and_prompt_uses_history() {
    let conversation = conversation();
    let synth = FakeSynthesizer::ok();

    let first = ScriptedStream::tokens(&["はじめまして。"]);
    run(first.as_ref(), &synth, &conversation).await;

    let second = ScriptedStream::tokens(&["また会ったね。"]);
    run(second.as_ref(), &synth, &conversation).await;

    let history = conversation.snapshot().await;
    assert_eq!(history.len(), 4);
    assert_eq!(
        second.prompts(),
        vec!["sys\nUser: こんにちは\nAssistant: はじめまして。\nUser: こんにちは\nAssistant:".to_string()]
    );
}
