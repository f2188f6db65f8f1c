//! 客户端协调集成测试
//!
//! 服务端渲染出的页面交给状态机，由测试充当宿主执行定时器和查询

use std::sync::Arc;
use std::time::Duration;

use lingo_relay::parsers::html::{DomTree, HtmlDocument};
use lingo_relay::reconcile::{
    read_pending, DeferredConfig, DeferredMachine, DeferredState, Dictionary, Effect,
    RecoveryMachine, RecoveryState, Timer,
};
use lingo_relay::translation::constants::{DICTIONARY_ID, PENDING_ID};
use lingo_relay::translation::{PageRequest, RenderMode, TranslationService};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{HtmlTestHelper, MockTranslator, RecordingStore, TestConfigBuilder};

const TWO_SEGMENTS: &str = "<html><head><title>Shop</title></head><body><p>Hello</p></body></html>";

fn config() -> DeferredConfig {
    DeferredConfig {
        initial_delay: Duration::from_millis(1000),
        poll_interval: Duration::from_millis(2000),
        max_polls: 3,
    }
}

#[tokio::test]
async fn test_deferred_client_applies_partial_results_then_falls_back() {
    let service = TranslationService::new(
        TestConfigBuilder::new().mode(RenderMode::Deferred).build(),
        Arc::new(MockTranslator::failing_on(&["Hello"])),
        Arc::new(RecordingStore::default()),
    )
    .unwrap();

    let page = service
        .render_page(PageRequest::new(TWO_SEGMENTS, "es"))
        .await
        .unwrap();
    assert_eq!(page.pending.len(), 2);
    page.background.unwrap().await.unwrap();

    let doc = HtmlDocument::parse(&page.html);
    let pending = read_pending(&doc, PENDING_ID);
    assert_eq!(pending, page.pending);

    let mut machine = DeferredMachine::new(pending, "es", config());
    assert_eq!(
        machine.start(),
        vec![Effect::ScheduleTimer {
            timer: Timer::Poll,
            after: Duration::from_millis(1000)
        }]
    );

    let mut polls = 0;
    let mut effects = machine.on_timer();
    while let [Effect::PostLookup { lang, segments }] = &effects[..] {
        polls += 1;
        let found = service.lookup(lang, None, segments).await.unwrap();
        effects = machine.on_response(&doc, &found);

        if polls == 1 {
            // 标题已经翻译，段落仍在等待
            assert_eq!(found.len(), 1);
            assert_eq!(machine.pending().len(), 1);
            assert_eq!(doc.text_content(&doc.first_element("title").unwrap()), "ES:Shop");
        }

        match &effects[..] {
            [Effect::ScheduleTimer { timer: Timer::Poll, after }] => {
                assert_eq!(*after, Duration::from_millis(2000));
                effects = machine.on_timer();
            }
            _ => break,
        }
    }

    assert_eq!(polls, 3);
    assert_eq!(machine.state(), DeferredState::Settled);
    assert!(machine.pending().is_empty());

    let html = doc.to_html().unwrap();
    assert!(html.contains("<title>ES:Shop</title>"));
    assert!(html.contains("<p>Hello</p>"));
    assert!(!html.contains("data-lingo-hash"));
    assert!(!html.contains(r#"class="lingo-pending""#));
}

#[tokio::test]
async fn test_recovery_reapplies_dictionary_after_client_rerender() {
    let service = TranslationService::new(
        TestConfigBuilder::new().mode(RenderMode::Immediate).build(),
        Arc::new(MockTranslator::default()),
        Arc::new(RecordingStore::default()),
    )
    .unwrap();

    let page = service
        .render_page(PageRequest::new(HtmlTestHelper::shop_page(), "es"))
        .await
        .unwrap();

    // 客户端框架用原始模板重新挂载了页面
    let doc = HtmlDocument::parse(HtmlTestHelper::shop_page());
    let dictionary = Dictionary::from_document(&HtmlDocument::parse(&page.html), DICTIONARY_ID)
        .expect("rendered page should embed a dictionary");
    assert_eq!(dictionary.lang, "es");

    let mut machine = RecoveryMachine::new(dictionary, Duration::from_millis(2000));
    let effects = machine.on_ready(&doc);
    assert_eq!(machine.state(), RecoveryState::Observing);
    assert!(effects.contains(&Effect::ObserveMutations));

    let html = doc.to_html().unwrap();
    assert!(html.contains("<title>ES:Shoe Shop</title>"));
    assert!(html.contains("<h1> ES:Welcome </h1>"));
    assert!(html.contains("<p>ES:Buy <b>red</b> shoes today</p>"));
    assert!(html.contains(r#"placeholder="ES:Search shoes""#));
    assert!(html.contains(r#"<div translate="no">Brand Name</div>"#));

    // 框架又把标题改回原文
    let h1 = doc.first_element("h1").unwrap();
    doc.set_text_content(&h1, "Welcome");
    machine.on_mutations(&doc, &[h1.clone()]);
    assert_eq!(doc.text_content(&h1), "ES:Welcome");

    assert_eq!(
        machine.on_window_elapsed(),
        vec![Effect::DisconnectObserver, Effect::RevealBody]
    );
}
