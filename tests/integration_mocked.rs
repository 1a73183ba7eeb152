/// Integration tests with mocked external APIs
/// Exercises the Gemini, ViaCEP and webhook HTTP contracts without real services
use conta_explicada_api::errors::AppError;
use conta_explicada_api::integrations::cep_client::{RegionLookup, RegionLookupOutcome, ViaCepClient};
use conta_explicada_api::integrations::gemini_client::{
    analyze_bill, DocumentIntelligence, GeminiClient, AUTH_FAILURE_MESSAGE,
    FALLBACK_EXTRACTION_MESSAGE,
};
use conta_explicada_api::integrations::webhook_client::{EventSink, WebhookNotifier};
use conta_explicada_api::integrations::webhook_models::NotificationEvent;
use conta_explicada_api::models::{BillImage, BillRecord, LeadRecord};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-test";
const GENERATE_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn gemini_text(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

fn bill_image() -> BillImage {
    BillImage::new("image/png", b"fake-png-bytes".to_vec())
}

#[tokio::test]
async fn test_gemini_extraction_and_narrative() {
    let mock_server = MockServer::start().await;

    let extracted = r#"```json
{"nome_titular":"Maria Souza","cep":"01310-100","consumo_kwh":450,"valor_total":320.0,
 "tem_energia_solar":false,"bandeira":"Verde","outros_itens":{"iluminacao_publica":null}}
```"#;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_string_contains("inlineData"))
        .and(body_string_contains("\"responseMimeType\":\"application/json\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text(extracted)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("###"))
        .and(body_string_contains("Maria Souza"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_text("Sua conta veio R$ 320 ⚡### Bandeira verde 🟢")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GeminiClient::new(
        mock_server.uri(),
        MODEL.to_string(),
        Some("test-key".to_string()),
    );
    let bill = analyze_bill(&client, &bill_image()).await.unwrap();

    assert_eq!(bill.nome_titular.as_deref(), Some("Maria Souza"));
    assert_eq!(bill.consumo_kwh, Some(450.0));
    assert_eq!(bill.bandeira.as_deref(), Some("Verde"));
    assert!(!bill.tem_energia_solar);
    assert_eq!(
        bill.analise_informal.as_deref(),
        Some("Sua conta veio R$ 320 ⚡### Bandeira verde 🟢")
    );
}

#[tokio::test]
async fn test_gemini_missing_required_field_uses_fallback_alert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_text(r#"{"nome_titular":"Maria","valor_total":320}"#)),
        )
        .mount(&mock_server)
        .await;

    let client = GeminiClient::new(mock_server.uri(), MODEL.to_string(), Some("k".to_string()));
    let err = client.extract_bill(&bill_image()).await.unwrap_err();

    assert!(matches!(err, AppError::Extraction(_)));
    assert_eq!(err.user_message(), FALLBACK_EXTRACTION_MESSAGE);
}

#[tokio::test]
async fn test_gemini_rejected_key_is_a_configuration_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key." }
        })))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::new(mock_server.uri(), MODEL.to_string(), Some("bad".to_string()));
    let err = client.extract_bill(&bill_image()).await.unwrap_err();

    assert!(matches!(err, AppError::Configuration(_)));
    assert_eq!(err.user_message(), AUTH_FAILURE_MESSAGE);
}

#[tokio::test]
async fn test_gemini_server_error_surfaces_generic_alert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::new(mock_server.uri(), MODEL.to_string(), Some("k".to_string()));
    let err = analyze_bill(&client, &bill_image()).await.unwrap_err();

    assert_eq!(err.user_message(), FALLBACK_EXTRACTION_MESSAGE);
}

#[tokio::test]
async fn test_viacep_found_and_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/01310100/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cep": "01310-100",
            "logradouro": "Avenida Paulista",
            "localidade": "São Paulo",
            "uf": "SP"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ViaCepClient::new(mock_server.uri());
    for _ in 0..2 {
        let outcome = client.lookup_region("01310100").await.unwrap();
        assert_eq!(outcome, RegionLookupOutcome::Found("SP".to_string()));
    }
}

#[tokio::test]
async fn test_viacep_erro_flag_means_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/99999999/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "erro": true })))
        .mount(&mock_server)
        .await;

    let client = ViaCepClient::new(mock_server.uri());
    let outcome = client.lookup_region("99999999").await.unwrap();
    assert_eq!(outcome, RegionLookupOutcome::NotFound);
}

#[tokio::test]
async fn test_viacep_server_error_is_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/20040002/json/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = ViaCepClient::new(mock_server.uri());
    assert!(matches!(
        client.lookup_region("20040002").await,
        Err(AppError::ExternalApiError(_))
    ));
    assert!(client.lookup_region("20040002").await.is_err());
}

#[tokio::test]
async fn test_webhook_posts_lead_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "evento": "NOVO_LEAD_QUALIFICADO_(FORMULÁRIO_PREENCHIDO)",
            "Nome do Titular": "Maria Souza",
            "Nome completo": "Maria Souza",
            "whatsapp": "(11) 98765-4321",
            "UF": "SP",
            "valor da conta": "R$ 320,00",
            "referencia das conta": "Não identificado",
            "consumo em kwh da conta": "450kwh"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bill = BillRecord {
        nome_titular: Some("Maria Souza".to_string()),
        valor_total: Some(320.0),
        consumo_kwh: Some(450.0),
        ..Default::default()
    };
    let lead = LeadRecord {
        nome: "Maria Souza".to_string(),
        whatsapp: "(11) 98765-4321".to_string(),
        cep: "01310-100".to_string(),
        estado: "SP".to_string(),
    };

    let notifier = WebhookNotifier::new(format!("{}/hook", mock_server.uri()));
    notifier
        .notify(NotificationEvent::lead_submitted(Some(&bill), &lead))
        .await;
}

#[tokio::test]
async fn test_webhook_failures_are_swallowed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(format!("{}/hook", mock_server.uri()));
    // Completes without panicking or returning an error
    notifier
        .notify(NotificationEvent::simulation_requested(None))
        .await;
}

#[tokio::test]
async fn test_webhook_keeps_posting_after_repeated_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(6)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(format!("{}/hook", mock_server.uri()));
    for _ in 0..5 {
        notifier
            .notify(NotificationEvent::simulation_requested(None))
            .await;
    }

    let lead = LeadRecord {
        nome: "Maria Souza".to_string(),
        whatsapp: "(11) 98765-4321".to_string(),
        cep: "01310-100".to_string(),
        estado: "SP".to_string(),
    };
    notifier
        .notify(NotificationEvent::lead_submitted(None, &lead))
        .await;

    let received = mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 6);
    assert!(String::from_utf8_lossy(&received[5].body).contains("Maria Souza"));
}
