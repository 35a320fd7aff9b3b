use super::codec::{self, validate_checksum};

/// Sentence formatters this layer acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentenceKind {
    Rmc,
    Gll,
    Vtg,
    Hdt,
    Hdg,
    Hdm,
    Vhw,
    Dpt,
    Dbt,
    Mtw,
    Mwv,
    Vwr,
    /// Proprietary electrical telemetry (`$P...ENV`).
    Env,
    Other,
}

impl SentenceKind {
    /// Match on the last three characters of the address, so any talker id
    /// (GP, GN, II, P) maps to the same formatter.
    pub fn from_address(address: &str) -> Self {
        let code = address
            .len()
            .checked_sub(3)
            .and_then(|start| address.get(start..))
            .unwrap_or("");
        match code {
            "RMC" => SentenceKind::Rmc,
            "GLL" => SentenceKind::Gll,
            "VTG" => SentenceKind::Vtg,
            "HDT" => SentenceKind::Hdt,
            "HDG" => SentenceKind::Hdg,
            "HDM" => SentenceKind::Hdm,
            "VHW" => SentenceKind::Vhw,
            "DPT" => SentenceKind::Dpt,
            "DBT" => SentenceKind::Dbt,
            "MTW" => SentenceKind::Mtw,
            "MWV" => SentenceKind::Mwv,
            "VWR" => SentenceKind::Vwr,
            "ENV" => SentenceKind::Env,
            _ => SentenceKind::Other,
        }
    }
}

/// Borrowed view of one received line.
#[derive(Clone, Debug)]
pub struct NmeaSentence<'a> {
    raw: &'a str,
    address: &'a str,
    fields: Vec<&'a str>,
    valid: bool,
}

impl<'a> NmeaSentence<'a> {
    pub fn parse(line: &'a str) -> Self {
        let raw = line.trim();
        let valid = validate_checksum(raw);
        let body = raw.split('*').next().unwrap_or("");
        let mut parts = body.split(',');
        let address = parts
            .next()
            .map(|a| a.trim_start_matches(|c: char| c == '$' || c == '!'))
            .unwrap_or("");
        Self {
            raw,
            address,
            fields: parts.collect(),
            valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Address without the start character, e.g. `GPRMC`.
    pub fn address(&self) -> &'a str {
        self.address
    }

    /// Talker id: the address minus its three-letter formatter.
    pub fn talker(&self) -> &'a str {
        let cut = self.address.len().saturating_sub(3);
        self.address.get(..cut).unwrap_or("")
    }

    pub fn kind(&self) -> SentenceKind {
        SentenceKind::from_address(self.address)
    }

    /// 1-based field; empty when absent.
    pub fn field(&self, n: usize) -> &'a str {
        n.checked_sub(1)
            .and_then(|i| self.fields.get(i))
            .copied()
            .unwrap_or("")
    }

    pub fn number(&self, n: usize) -> Option<f64> {
        codec::number(self.field(n))
    }

    pub fn integer(&self, n: usize) -> Option<i64> {
        self.field(n).trim().parse().ok()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }
}
