//! Dataset profiles: the declared shape of each exported dataset type.
//!
//! A [`DatasetProfile`] fixes, for one dataset type, the column set written to every artifact,
//! which columns are required, how missing values are imputed, the partition date column and the
//! quality checks to run. Profiles are resolved once at pipeline start; the engine never inspects
//! column names on its own.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};
use crate::types::{DataType, Field, Schema};

/// How a missing value in a column is imputed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FillPolicy {
    /// Leave missing values as they are.
    #[default]
    Keep,
    /// Numeric zero of the column's type.
    Zero,
    /// A fixed text placeholder.
    Placeholder { text: String },
    /// `"<prefix> <row id>"`, using the profile's id column.
    SynthesizedLabel { prefix: String },
    /// The run's processing date.
    ProcessingDate,
    /// The value of another date column in the same row, else the processing date.
    FromColumn { column: String },
}

/// Rewrite applied to present values after imputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalizer {
    /// Keep only the ASCII digits of text values.
    DigitsOnly,
    /// Integers become `1` when positive and `0` otherwise.
    Flag,
    /// Text equal to `from`, ignoring case, becomes `to`.
    Replace { from: String, to: String },
}

/// A declared data quality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum QualityCheck {
    /// `later` must not precede `earlier` when both are present.
    Chronology { earlier: String, later: String },
    /// Present values must be strictly positive.
    PositiveAmount { column: String },
    /// Present values, reduced to their digits, must have one of `allowed_lengths` digits.
    IdentifierLength { column: String, allowed_lengths: Vec<usize> },
}

impl QualityCheck {
    /// Columns the check reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            QualityCheck::Chronology { earlier, later } => vec![earlier.as_str(), later.as_str()],
            QualityCheck::PositiveAmount { column } | QualityCheck::IdentifierLength { column, .. } => {
                vec![column.as_str()]
            }
        }
    }
}

/// One column of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Name, type and accepted header aliases.
    #[serde(flatten)]
    pub field: Field,
    /// Whether a missing value is reported as an anomaly.
    #[serde(default)]
    pub required: bool,
    /// Imputation applied after scanning.
    #[serde(default)]
    pub fill: FillPolicy,
    /// Normalization applied after imputation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<Normalizer>,
}

impl ColumnSpec {
    /// Optional column with no imputation.
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            field: Field::new(name, data_type),
            required: false,
            fill: FillPolicy::Keep,
            normalize: None,
        }
    }

    /// Mark the column required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the fill policy.
    pub fn fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }

    /// Add an accepted header alias.
    pub fn alias(mut self, alias: &str) -> Self {
        self.field = self.field.with_alias(alias);
        self
    }

    /// Load unparseable numeric cells as null.
    pub fn lenient(mut self) -> Self {
        self.field = self.field.lenient();
        self
    }

    /// Set the normalizer.
    pub fn normalize(mut self, normalizer: Normalizer) -> Self {
        self.normalize = Some(normalizer);
        self
    }
}

/// `_`-separated words that start artifact labels. Dataset names may not contain them, so one
/// dataset's artifacts never parse as another's.
const RESERVED_NAME_WORDS: &[&str] = &["complete", "anomaly", "part", "no"];

fn check_dataset_name(name: &str) -> Result<(), String> {
    for word in name.split('_') {
        if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "name '{name}' must be ASCII letters and digits in '_'-separated words"
            ));
        }
        if word.starts_with(|c: char| c.is_ascii_digit()) || RESERVED_NAME_WORDS.contains(&word) {
            return Err(format!("name '{name}' has word '{word}', which reads as an artifact label"));
        }
    }
    Ok(())
}

/// The declared shape and rules of one dataset type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Dataset type, used as the artifact name prefix.
    pub name: String,
    /// Input file stem looked up by [`crate::execution::discover_jobs`].
    pub input_name: String,
    /// Columns in artifact order.
    pub columns: Vec<ColumnSpec>,
    /// Column used for date bucketing; row-count splitting when `None`.
    #[serde(default)]
    pub partition_date_column: Option<String>,
    /// Row identifier column, used for synthesized labels and integrity checks.
    #[serde(default)]
    pub id_column: Option<String>,
    /// Columns whose totals must survive splitting.
    #[serde(default)]
    pub monetary_columns: Vec<String>,
    /// Quality checks besides the required-column null check.
    #[serde(default)]
    pub checks: Vec<QualityCheck>,
}

impl DatasetProfile {
    /// Schema of the profile's columns, in order.
    pub fn schema(&self) -> Schema {
        Schema::new(self.columns.iter().map(|c| c.field.clone()).collect())
    }

    /// Column spec by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.field.name == name)
    }

    /// Names of required columns.
    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.field.name.as_str())
    }

    /// Check that every column referenced by the profile is declared with a suitable type.
    pub fn validate(&self) -> ExportResult<()> {
        let invalid = |message: String| ExportError::InvalidConfig {
            message: format!("profile '{}': {message}", self.name),
        };
        check_dataset_name(&self.name).map_err(invalid)?;
        if self.columns.is_empty() {
            return Err(invalid("at least one column is required".to_string()));
        }
        for (i, c) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|p| p.field.name == c.field.name) {
                return Err(invalid(format!("duplicate column '{}'", c.field.name)));
            }
        }

        let typed = |name: &str, want: &[DataType], what: &str| match self.column(name) {
            None => Err(invalid(format!("{what} '{name}' is not a declared column"))),
            Some(c) if !want.is_empty() && !want.contains(&c.field.data_type) => Err(invalid(format!(
                "{what} '{name}' has type {:?}",
                c.field.data_type
            ))),
            Some(_) => Ok(()),
        };

        if let Some(col) = &self.partition_date_column {
            typed(col, &[DataType::Date], "partition date column")?;
        }
        if let Some(col) = &self.id_column {
            typed(col, &[], "id column")?;
        }
        for col in &self.monetary_columns {
            typed(col, &[DataType::Int64, DataType::Float64], "monetary column")?;
        }
        for check in &self.checks {
            match check {
                QualityCheck::Chronology { earlier, later } => {
                    typed(earlier, &[DataType::Date], "chronology column")?;
                    typed(later, &[DataType::Date], "chronology column")?;
                }
                QualityCheck::PositiveAmount { column } => {
                    typed(column, &[DataType::Int64, DataType::Float64], "amount column")?;
                }
                QualityCheck::IdentifierLength { column, .. } => {
                    typed(column, &[DataType::Utf8, DataType::Int64], "identifier column")?;
                }
            }
        }
        for c in &self.columns {
            let name = &c.field.name;
            match (&c.fill, c.field.data_type) {
                (FillPolicy::Zero, t) if !t.is_numeric() => {
                    return Err(invalid(format!("zero fill on non-numeric column '{name}'")));
                }
                (FillPolicy::ProcessingDate | FillPolicy::FromColumn { .. }, t) if t != DataType::Date => {
                    return Err(invalid(format!("date fill on non-date column '{name}'")));
                }
                (FillPolicy::Placeholder { .. } | FillPolicy::SynthesizedLabel { .. }, t) if t != DataType::Utf8 => {
                    return Err(invalid(format!("text fill on non-text column '{name}'")));
                }
                (FillPolicy::SynthesizedLabel { .. }, _) if self.id_column.is_none() => {
                    return Err(invalid(format!("synthesized label on '{name}' needs an id column")));
                }
                (FillPolicy::FromColumn { column }, _) => typed(column, &[DataType::Date], "fill source column")?,
                _ => {}
            }
            let wanted = match c.normalize {
                None => continue,
                Some(Normalizer::Flag) => DataType::Int64,
                Some(Normalizer::DigitsOnly | Normalizer::Replace { .. }) => DataType::Utf8,
            };
            if c.field.data_type != wanted {
                return Err(invalid(format!("normalizer on '{name}' needs a {wanted:?} column")));
            }
        }
        Ok(())
    }
}

/// The set of dataset profiles known to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Profiles in processing order.
    pub profiles: Vec<DatasetProfile>,
}

impl Catalog {
    /// Built-in profiles: `accounts_payable`, `accounts_receivable` and `contacts`.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![accounts_payable(), accounts_receivable(), contacts()],
        }
    }

    /// Load and validate a catalog from a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> ExportResult<Self> {
        let raw = fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Profile by dataset type name.
    pub fn get(&self, name: &str) -> Option<&DatasetProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Validate every profile and reject duplicate names.
    pub fn validate(&self) -> ExportResult<()> {
        for (i, p) in self.profiles.iter().enumerate() {
            p.validate()?;
            if self.profiles[..i].iter().any(|q| q.name == p.name) {
                return Err(ExportError::InvalidConfig {
                    message: format!("duplicate profile '{}'", p.name),
                });
            }
        }
        Ok(())
    }
}

fn text(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, DataType::Utf8)
}

fn money(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, DataType::Float64).fill(FillPolicy::Zero)
}

/// Columns shared by payables and receivables, up to the counterparty column.
fn ledger_columns(counterparty: &str, label_prefix: &str, method_suffix: &str) -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("Id", DataType::Int64).required().alias("ID"),
        text(counterparty).required().fill(FillPolicy::SynthesizedLabel {
            prefix: label_prefix.to_string(),
        }),
        ColumnSpec::new("Data Emissao", DataType::Date)
            .required()
            .alias("Data emissao")
            .fill(FillPolicy::ProcessingDate),
        ColumnSpec::new("Data vencimento", DataType::Date)
            .required()
            .alias("Data Vencimento")
            .fill(FillPolicy::FromColumn {
                column: "Data Emissao".to_string(),
            }),
        ColumnSpec::new("Data Liquidacao", DataType::Date).alias("Data liquidacao"),
        money("Valor documento").required(),
        money("Saldo"),
        text("Situacao").alias("Situação"),
        text("Numero do documento").alias("Numero documento"),
        text("Numero no banco"),
        text("Categoria"),
        text("Historico"),
        text(&format!("Forma de {method_suffix}")).alias(&format!("Forma {method_suffix}")),
        text(&format!("Meio de {method_suffix}")),
        money("Taxas"),
    ]
}

fn ledger_checks() -> Vec<QualityCheck> {
    vec![
        QualityCheck::Chronology {
            earlier: "Data Emissao".to_string(),
            later: "Data vencimento".to_string(),
        },
        QualityCheck::Chronology {
            earlier: "Data Emissao".to_string(),
            later: "Data Liquidacao".to_string(),
        },
        QualityCheck::PositiveAmount {
            column: "Valor documento".to_string(),
        },
    ]
}

fn accounts_payable() -> DatasetProfile {
    let mut columns = ledger_columns("Fornecedor", "Fornecedor", "pagamento");
    if let Some(situation) = columns.iter_mut().find(|c| c.field.name == "Situacao") {
        situation.normalize = Some(Normalizer::Replace {
            from: "liquidado".to_string(),
            to: "paga".to_string(),
        });
    }
    columns.push(ColumnSpec::new("Estabelecimento_id", DataType::Int64).fill(FillPolicy::Zero));
    DatasetProfile {
        name: "accounts_payable".to_string(),
        input_name: "contas_a_pagar".to_string(),
        columns,
        partition_date_column: Some("Data Emissao".to_string()),
        id_column: Some("Id".to_string()),
        monetary_columns: vec!["Valor documento".to_string(), "Saldo".to_string()],
        checks: ledger_checks(),
    }
}

fn accounts_receivable() -> DatasetProfile {
    DatasetProfile {
        name: "accounts_receivable".to_string(),
        input_name: "contas_a_receber".to_string(),
        columns: ledger_columns("Cliente", "Cliente", "recebimento"),
        partition_date_column: Some("Data Emissao".to_string()),
        id_column: Some("Id".to_string()),
        monetary_columns: vec!["Valor documento".to_string(), "Saldo".to_string()],
        checks: ledger_checks(),
    }
}

fn contacts() -> DatasetProfile {
    let digits = |name: &str| text(name).normalize(Normalizer::DigitsOnly);
    let columns = vec![
        ColumnSpec::new("ID", DataType::Int64).required().alias("Id"),
        text("Código").alias("Codigo"),
        text("Nome")
            .required()
            .fill(FillPolicy::SynthesizedLabel {
                prefix: "Contato".to_string(),
            }),
        text("Fantasia"),
        text("Endereço"),
        text("Número").alias("Numero"),
        text("Complemento"),
        text("Bairro"),
        text("CEP"),
        text("Cidade"),
        text("Estado"),
        text("Observações do contato").alias("Observaçoes do contato"),
        text("Fone"),
        text("Fax"),
        text("Celular"),
        text("E-mail"),
        text("Web Site"),
        text("Tipo pessoa"),
        digits("CNPJ / CPF").alias("CNPJ/CPF"),
        text("IE / RG").alias("IE/RG"),
        text("IE isento"),
        text("Situação"),
        text("Observações"),
        text("Estado civil"),
        text("Profissão"),
        text("Sexo"),
        ColumnSpec::new("Data nascimento", DataType::Date),
        text("Naturalidade"),
        text("Nome pai"),
        digits("CPF pai"),
        text("Nome mãe"),
        digits("CPF mãe"),
        text("Lista de Preço"),
        text("Vendedor"),
        text("E-mail para envio de NFe"),
        text("Tipos de Contatos").alias("Tipos de contato"),
        // The extractor writes 'Não' here.
        ColumnSpec::new("Contribuinte", DataType::Int64)
            .lenient()
            .fill(FillPolicy::Zero)
            .normalize(Normalizer::Flag),
        text("Código de regime tributário").alias("Codigo de regime tributario"),
        money("Limite de crédito").alias("Limite de credito").lenient(),
    ];

    let cpf = |column: &str, allowed_lengths: Vec<usize>| QualityCheck::IdentifierLength {
        column: column.to_string(),
        allowed_lengths,
    };
    DatasetProfile {
        name: "contacts".to_string(),
        input_name: "contatos".to_string(),
        columns,
        partition_date_column: None,
        id_column: Some("ID".to_string()),
        monetary_columns: Vec::new(),
        checks: vec![
            cpf("CNPJ / CPF", vec![11, 14]),
            cpf("CPF pai", vec![11]),
            cpf("CPF mãe", vec![11]),
        ],
    }
}
