use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;

/// Which register-level driver reads a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Pmsa003i,
    Mcp9808,
    Ina219,
    Scd30,
    Bme680,
}

/// Logical sensor identity: one driver instance on one mux channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRole {
    pub name: &'static str,
    pub parameters: &'static [&'static str],
    pub channel: u8,
    pub address: u16,
    pub kind: SensorKind,
}

/// One (role, parameter) pair; one CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub role: &'static str,
    pub parameter: &'static str,
}

impl Column {
    pub fn label(&self) -> String {
        format!("{} {}", self.role, self.parameter)
    }
}

/// Ordered column list, derived once from the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn from_roles(roles: &[SensorRole]) -> Self {
        let columns = roles
            .iter()
            .flat_map(|role| {
                role.parameters.iter().map(move |&parameter| Column {
                    role: role.name,
                    parameter,
                })
            })
            .collect();
        Schema { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, role: &str, parameter: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.role == role && c.parameter == parameter)
    }
}

/// Loop bookkeeping for one averaging window
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub ticks: u32,
    pub skipped_reads: u32,
    pub total_wait: Duration,
    pub elapsed: Duration,
}

impl WindowStats {
    pub fn average_wait(&self) -> Duration {
        if self.ticks == 0 {
            Duration::ZERO
        } else {
            self.total_wait / self.ticks
        }
    }
}

/// Raw samples collected during one window, one buffer per schema column
///
/// Buffers only grow during the window; the next window starts from
/// `WindowBuffers::new`.
#[derive(Debug, Clone)]
pub struct WindowBuffers {
    pub started: OffsetDateTime,
    pub schema: Schema,
    pub samples: Vec<Vec<f64>>,
    pub stats: WindowStats,
}

impl WindowBuffers {
    pub fn new(schema: Schema, started: OffsetDateTime) -> Self {
        let samples = vec![Vec::new(); schema.len()];
        WindowBuffers {
            started,
            schema,
            samples,
            stats: WindowStats::default(),
        }
    }

    pub fn push(&mut self, column: usize, value: f64) {
        if let Some(buffer) = self.samples.get_mut(column) {
            buffer.push(value);
        }
    }

    #[cfg(test)]
    pub fn buffer(&self, role: &str, parameter: &str) -> Option<&[f64]> {
        self.schema
            .position(role, parameter)
            .map(|i| self.samples[i].as_slice())
    }
}

/// Averaged value of one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Average {
    Mean(f64),
    Unavailable,
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // `{:?}` keeps the decimal point on whole numbers (21.0, not 21)
            Average::Mean(value) => write!(f, "{:?}", value),
            Average::Unavailable => f.write_str("NA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    pub column: Column,
    pub average: Average,
    pub samples: usize,
}

/// One output row: window start plus one entry per schema column
#[derive(Debug, Clone)]
pub struct AveragedRecord {
    pub started: OffsetDateTime,
    pub entries: Vec<RecordEntry>,
}

impl AveragedRecord {
    #[cfg(test)]
    pub fn get(&self, role: &str, parameter: &str) -> Option<Average> {
        self.entries
            .iter()
            .find(|e| e.column.role == role && e.column.parameter == parameter)
            .map(|e| e.average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWER: &[&str] = &["Current", "Power", "Voltage"];

    fn role(name: &'static str, channel: u8) -> SensorRole {
        SensorRole {
            name,
            parameters: POWER,
            channel,
            address: 0x40,
            kind: SensorKind::Ina219,
        }
    }

    #[test]
    fn schema_follows_role_then_parameter_order() {
        let schema = Schema::from_roles(&[role("WIFI", 7), role("Fans", 2)]);

        let labels: Vec<String> = schema.columns().iter().map(Column::label).collect();

        assert_eq!(
            labels,
            [
                "WIFI Current",
                "WIFI Power",
                "WIFI Voltage",
                "Fans Current",
                "Fans Power",
                "Fans Voltage"
            ]
        );
        assert_eq!(schema.position("Fans", "Power"), Some(4));
        assert_eq!(schema.position("Fans", "Temp"), None);
    }

    #[test]
    fn unavailable_prints_as_na() {
        assert_eq!(Average::Unavailable.to_string(), "NA");
        assert_eq!(Average::Mean(20.5).to_string(), "20.5");
        assert_eq!(Average::Mean(21.0).to_string(), "21.0");
    }
}
