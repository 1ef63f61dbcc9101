// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::{json, Value};
use toolgate::guardrails::{
    extract_text, ContentModerationGuardrail, Guardrail, ModerationConfig, PiiConfig,
    PiiDetectionGuardrail, PiiType, PromptInjectionGuardrail,
};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data).into_owned();

    let pii = PiiDetectionGuardrail::new(PiiConfig {
        detect_types: vec![PiiType::Email, PiiType::Phone, PiiType::Ssn, PiiType::CreditCard, PiiType::Name],
        ..PiiConfig::default()
    })
    .unwrap();
    let detections = pii.detect(&text);
    // Byte offsets must land on char boundaries
    for d in &detections {
        assert!(text.is_char_boundary(d.start) && text.is_char_boundary(d.end));
    }
    let _ = pii.redact(&text, &detections, true);

    let injection = PromptInjectionGuardrail::new(Default::default()).unwrap();
    let _ = injection.detect(&text);

    // Local moderation only; no api key configured
    let moderation = ContentModerationGuardrail::new(ModerationConfig::default()).unwrap();
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let _ = rt.block_on(moderation.evaluate(&json!({ "prompt": text }), &Value::Null));

    if let Ok(value) = serde_json::from_slice::<Value>(data) {
        let _ = extract_text(&value);
    }
});
