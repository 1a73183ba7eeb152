//! Fixed instructions and response schema for bill extraction.

use serde_json::{json, Value};

use crate::models::BillRecord;

pub const SYSTEM_INSTRUCTION: &str = r#"
Você é um auditor especialista em faturas de energia elétrica (ANEEL).
Sua missão é desvendar a matemática da conta para o cliente de forma visual e didática.
Extraia o nome completo do titular da fatura.
Extraia o CEP do endereço do titular.

REGRAS CRÍTICAS PARA CLIENTES COM ENERGIA SOLAR:
1. A matemática da conta solar é: (Leitura Atual - Leitura Anterior) = Consumo Real.
2. Identifique a tabela de MEDIÇÃO. Extraia "Leitura Atual" e "Leitura Anterior".
3. Identifique a linha de créditos (CAT/Injeção).
4. O 'consumo_kwh' deve ser o valor FINAL (o resíduo ou taxa mínima).

Seja extremamente preciso ao capturar: Leitura Atual, Leitura Anterior e Crédito Compensado.
"#;

pub const ANALYSIS_PROMPT: &str = r#"
Analise esta fatura.
1. Extraia o nome do titular.
2. Extraia o CEP do endereço.
3. Extraia Leitura Atual e Leitura Anterior da tabela de medição.
4. Identifique o valor de Energia Compensada/Injetada (CAT/Créditos).
5. Extraia TE, TUSD, Impostos e Histórico.
"#;

/// Response schema for the extraction call (Gemini OpenAPI subset).
pub fn bill_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "nome_titular": { "type": "STRING", "description": "Nome completo do titular da conta de energia." },
            "cep": { "type": "STRING", "description": "CEP do endereço do titular. Formato: 00000-000" },
            "mes_referencia": { "type": "STRING", "description": "Mês e ano da conta (ex: 10/2025)" },
            "consumo_kwh": { "type": "NUMBER", "description": "O consumo final FATURADO (após abatimento dos créditos). Ex: 24.96" },
            "valor_total": { "type": "NUMBER", "description": "Valor total da fatura em R$" },
            "te": { "type": "NUMBER", "description": "Valor total cobrado como TE (Tarifa de Energia)" },
            "tusd": { "type": "NUMBER", "description": "Valor total cobrado como TUSD (Uso do Sistema de Distribuição)" },
            "bandeira": { "type": "STRING", "description": "Cor da bandeira tarifária vigente" },
            "tem_energia_solar": { "type": "BOOLEAN", "description": "True se houver créditos, injeção, CAT ou saldo compensado." },
            "energia_injetada": { "type": "NUMBER", "description": "Quantidade de kWh compensada/injetada. Ex: 194.04" },
            "saldo_acumulado": { "type": "NUMBER", "description": "Saldo de créditos acumulados para próximos meses." },
            "tusd_gd": { "type": "NUMBER", "description": "Valor monetário (R$) cobrado como 'Fio B' ou 'TUSD GD'." },
            "leituras": {
                "type": "OBJECT",
                "description": "Dados da tabela de medição do medidor.",
                "properties": {
                    "atual": { "type": "NUMBER", "description": "Número da Leitura Atual do medidor." },
                    "anterior": { "type": "NUMBER", "description": "Número da Leitura Anterior do medidor." }
                }
            },
            "historico": {
                "type": "ARRAY",
                "description": "Lista com o histórico de consumo dos últimos meses.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "mes": { "type": "STRING", "description": "Mês" },
                        "consumo_kwh": { "type": "NUMBER", "description": "kWh" }
                    }
                }
            },
            "impostos": {
                "type": "OBJECT",
                "properties": {
                    "icms": { "type": "NUMBER" },
                    "pis": { "type": "NUMBER" },
                    "cofins": { "type": "NUMBER" }
                }
            },
            "outros_itens": {
                "type": "OBJECT",
                "properties": {
                    "iluminacao_publica": { "type": "NUMBER" },
                    "energia_reativa": { "type": "NUMBER" }
                }
            }
        },
        "required": BillRecord::REQUIRED_FIELDS,
    })
}

/// Prompt for the chat-style narrative, split into messages by `###`.
pub fn summary_prompt(bill_json: &str) -> String {
    format!(
        r####"
Aja como um consultor enviando mensagens no WhatsApp. Use linguagem simples, direta e abuse de emojis para explicar.
Dados: {bill_json}.

Separe suas respostas usando exatamente a string "###". Cada bloco separado por ### será uma mensagem enviada com pausa.

ESTRUTURA OBRIGATÓRIA DA RESPOSTA:

Se for solar (tem_energia_solar=true):
Mensagem 1:
Parabenize pela decisão de ter energia solar. Diga que é um excelente investimento.
###
Mensagem 2:
Explique a matemática exata da medição em lista. Use este formato:
"Vamos aos números da sua geração:"
🟢 Leitura Atual: {{valor}}
🔴 Leitura Anterior: {{valor}}
⚡ **Consumo Real da Casa**: {{cálculo de Atual - Anterior}} kWh
###
Mensagem 3:
Explique o faturamento final em lista:
📉 **Energia Compensada (Seus Créditos)**: {{valor da injeção/CAT}} kWh
💰 **Energia Faturada (O que sobrou)**: {{consumo_kwh}} kWh
🔋 **Saldo/Excedente**: {{valor do saldo se houver, ou 0}} kWh
###
Mensagem 4:
Conclusão curta sobre o valor financeiro pago (Taxa mínima + Ilum. Pública).

Se NÃO for solar:
Mensagem 1:
Resumo direto do consumo e valor total.
###
Mensagem 2:
Lista detalhada de para onde foi o dinheiro:
🏢 Distribuição/Energia: R$ {{valor}}
🏛️ Impostos (ICMS/PIS/COFINS): R$ {{valor}}
💡 Iluminação Pública: R$ {{valor}}
###
Mensagem 3:
Alerta sobre a bandeira tarifária e se o consumo está alto para a média.

CONSTRAINT NEGATIVA:
- NÃO termine com despedidas como "Espero ter ajudado", "Qualquer dúvida". O sistema encerrará a conversa.
"####
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_boundary_fields() {
        let schema = bill_response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(
            required,
            vec!["consumo_kwh", "valor_total", "tem_energia_solar", "nome_titular", "cep"]
        );
        assert_eq!(schema["properties"]["leituras"]["type"], "OBJECT");
    }

    #[test]
    fn test_summary_prompt_embeds_record_and_delimiter() {
        let prompt = summary_prompt(r#"{"valor_total":320.0}"#);
        assert!(prompt.contains(r#"Dados: {"valor_total":320.0}."#));
        assert!(prompt.contains("###"));
        assert!(prompt.contains("{valor}"));
    }
}
