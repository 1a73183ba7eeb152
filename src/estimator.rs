//! Solar savings heuristics for Brazilian residential bills.
//!
//! Every absent numeric field is read as zero, so a bill without a public
//! lighting line is estimated as if that charge were R$ 0,00.

use crate::models::{BillRecord, Reinforcement, SavingsResult};

/// kWh produced per installed kWp per month (regional average).
pub const GENERATION_FACTOR_KWH_PER_KWP: f64 = 130.0;

/// Minimum availability charge kept on a solar bill, in BRL.
pub const MINIMUM_AVAILABILITY_CHARGE: f64 = 50.0;

/// Markup approximating the non-solar tariff over real consumption.
pub const NON_SOLAR_TARIFF_FACTOR: f64 = 1.15;

/// Rounds to 2 decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimates the bill and savings the customer would have with a solar system.
///
/// Total function: no input produces an error, and monthly savings never go
/// below zero.
pub fn calculate_solar_savings(bill: &BillRecord) -> SavingsResult {
    let consumo = bill.consumo_kwh.unwrap_or(0.0);
    let valor_total = bill.valor_total.unwrap_or(0.0);
    let iluminacao_publica = bill.iluminacao_publica().unwrap_or(0.0);

    let nova_conta = MINIMUM_AVAILABILITY_CHARGE + iluminacao_publica;
    let economia_mensal = (valor_total - nova_conta).max(0.0);

    SavingsResult {
        economia_mensal: round2(economia_mensal),
        economia_anual: round2(economia_mensal * 12.0),
        economia_5anos: round2(economia_mensal * 12.0 * 5.0),
        economia_25anos: round2(economia_mensal * 12.0 * 25.0),
        tamanho_sistema_kwp: round2(consumo / GENERATION_FACTOR_KWH_PER_KWP),
        nova_conta_estimada: round2(nova_conta),
    }
}

/// Estimates what a distributed-generation customer would pay without solar.
///
/// Only defined for bills with distributed generation whose current reading is
/// strictly greater than the previous one.
pub fn reinforcement_estimate(bill: &BillRecord) -> Option<Reinforcement> {
    if !bill.tem_energia_solar {
        return None;
    }

    let consumo_real = bill.consumo_real()?;
    if consumo_real <= 0.0 {
        return None;
    }

    Some(Reinforcement {
        consumo_real,
        valor_estimado_sem_solar: round2(consumo_real * NON_SOLAR_TARIFF_FACTOR),
        valor_pago: bill.valor_total,
    })
}
