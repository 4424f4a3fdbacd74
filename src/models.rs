//! Data models for the telemetry pipeline.
//!
//! Field names follow the wire vocabulary the sensors and the ledger file
//! already use (`leituras`, `alertas`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Which store accepted a write or produced a read.
///
/// Reported in every response, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTag {
    Primary,
    Fallback,
}

impl StorageTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageTag::Primary => "primary",
            StorageTag::Fallback => "fallback",
        }
    }
}

/// Alert severity levels known to the primary store's lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All levels, most severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Code stored in `ww_nivel_severidade.codigo_severidade`.
    pub fn code(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICO",
            Severity::High => "ALTO",
            Severity::Medium => "MEDIO",
            Severity::Low => "BAIXO",
        }
    }

    /// Stable identifier of the level in the lookup table.
    pub fn id(self) -> i16 {
        match self {
            Severity::Critical => 1,
            Severity::High => 2,
            Severity::Medium => 3,
            Severity::Low => 4,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Severity::Critical => "Risco crítico de enchente",
            Severity::High => "Risco alto",
            Severity::Medium => "Risco médio",
            Severity::Low => "Risco baixo",
        }
    }

    pub fn recommended_action(self) -> &'static str {
        match self {
            Severity::Critical => "Acionar plano de evacuação e drenagem imediatamente",
            Severity::High => "Preparar drenagem e avisar o produtor",
            Severity::Medium => "Aumentar a frequência de monitoramento",
            Severity::Low => "Manter monitoramento de rotina",
        }
    }

    pub fn from_code(code: &str) -> Option<Severity> {
        Severity::ALL.into_iter().find(|s| s.code() == code)
    }
}

/// A validated sensor reading that has not been written anywhere yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    // ---
    pub id_sensor: i64,
    pub umidade_solo: f64,
    pub temperatura_ar: f64,
    pub precipitacao_mm: f64,
    pub timestamp: DateTime<Utc>,
    pub farm_id: Option<String>,
    pub team_name: Option<String>,
}

impl NewReading {
    pub fn into_stored(self, id_leitura: i64) -> StoredReading {
        // ---
        StoredReading {
            id_leitura,
            id_sensor: self.id_sensor,
            umidade_solo: self.umidade_solo,
            temperatura_ar: self.temperatura_ar,
            precipitacao_mm: self.precipitacao_mm,
            timestamp: self.timestamp,
            farm_id: self.farm_id,
            team_name: self.team_name,
            synced: false,
        }
    }
}

/// A reading as held by either store.
///
/// `synced` is only meaningful in the fallback ledger, where it marks entries
/// already replayed into the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredReading {
    // ---
    pub id_leitura: i64,
    pub id_sensor: i64,
    pub umidade_solo: f64,
    pub temperatura_ar: f64,
    pub precipitacao_mm: f64,
    pub timestamp: DateTime<Utc>,
    pub farm_id: Option<String>,
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[sqlx(default)]
    pub synced: bool,
}

impl StoredReading {
    pub fn to_new(&self) -> NewReading {
        // ---
        NewReading {
            id_sensor: self.id_sensor,
            umidade_solo: self.umidade_solo,
            temperatura_ar: self.temperatura_ar,
            precipitacao_mm: self.precipitacao_mm,
            timestamp: self.timestamp,
            farm_id: self.farm_id.clone(),
            team_name: self.team_name.clone(),
        }
    }
}

/// A validated alert that has not been written anywhere yet.
///
/// `codigo_severidade` stays a raw string: only the primary store resolves
/// it against the severity table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    // ---
    pub id_produtor: i64,
    pub codigo_severidade: String,
    pub descricao_alerta: String,
    pub id_leitura: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_stored(self, id_alerta: i64) -> StoredAlert {
        // ---
        StoredAlert {
            id_alerta,
            id_produtor: self.id_produtor,
            codigo_severidade: self.codigo_severidade,
            descricao_alerta: self.descricao_alerta,
            id_leitura: self.id_leitura,
            timestamp: self.timestamp,
            synced: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredAlert {
    // ---
    pub id_alerta: i64,
    pub id_produtor: i64,
    pub codigo_severidade: String,
    pub descricao_alerta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_leitura: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[sqlx(default)]
    pub synced: bool,
}

impl StoredAlert {
    pub fn to_new(&self) -> NewAlert {
        // ---
        NewAlert {
            id_produtor: self.id_produtor,
            codigo_severidade: self.codigo_severidade.clone(),
            descricao_alerta: self.descricao_alerta.clone(),
            id_leitura: self.id_leitura,
            timestamp: self.timestamp,
        }
    }
}
