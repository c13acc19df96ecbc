//! Built-in operator types
//!
//! Each built-in validates its required parameters at construction time and
//! renders an engine-consumable payload. Semantic correctness of the values
//! (does the endpoint exist, is the SQL valid) is the target engine's
//! problem, not ours.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::json;
use serde_yaml::Value;

/// A concrete, engine-consumable task object.
///
/// Opaque to the compiler beyond "was constructed without error"; the
/// payload is what the engine-integration collaborator serializes.
pub trait Operator: fmt::Debug + Send + Sync {
    fn operator_type(&self) -> &str;
    fn engine_payload(&self) -> serde_json::Value;
}

pub(crate) type Params = BTreeMap<String, Value>;

fn require_str(params: &Params, key: &str) -> Result<String, String> {
    match params.get(key) {
        Some(v) => v
            .as_str()
            .map(String::from)
            .ok_or_else(|| format!("parameter '{}' must be a string", key)),
        None => Err(format!("missing required parameter '{}'", key)),
    }
}

fn optional_str(params: &Params, key: &str) -> Result<Option<String>, String> {
    match params.get(key) {
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| format!("parameter '{}' must be a string", key)),
        None => Ok(None),
    }
}

/// Accepts a single string or a sequence of strings (email-style fields)
fn str_or_list(params: &Params, key: &str) -> Result<Option<Vec<String>>, String> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| format!("parameter '{}' must contain only strings", key))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(format!(
            "parameter '{}' must be a string or a list of strings",
            key
        )),
    }
}

fn yaml_to_json(value: &Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[derive(Debug)]
pub struct BashOperator {
    pub bash_command: String,
}

impl BashOperator {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        Ok(Self {
            bash_command: require_str(params, "bash_command")?,
        })
    }
}

impl Operator for BashOperator {
    fn operator_type(&self) -> &str {
        "BashOperator"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({ "bash_command": self.bash_command })
    }
}

/// Shared shape of the python-callable family
#[derive(Debug)]
pub struct PythonCallable {
    pub python_callable: String,
    pub op_args: Vec<Value>,
    pub op_kwargs: BTreeMap<String, Value>,
}

impl PythonCallable {
    fn from_params(params: &Params) -> Result<Self, String> {
        let python_callable = require_str(params, "python_callable")?;

        let op_args = match params.get("op_args") {
            None => Vec::new(),
            Some(Value::Sequence(items)) => items.clone(),
            Some(_) => return Err("parameter 'op_args' must be a sequence".to_string()),
        };

        let op_kwargs = match params.get("op_kwargs") {
            None => BTreeMap::new(),
            Some(Value::Mapping(map)) => {
                let mut kwargs = BTreeMap::new();
                for (k, v) in map {
                    let key = k
                        .as_str()
                        .ok_or_else(|| "op_kwargs keys must be strings".to_string())?;
                    kwargs.insert(key.to_string(), v.clone());
                }
                kwargs
            }
            Some(_) => return Err("parameter 'op_kwargs' must be a mapping".to_string()),
        };

        Ok(Self {
            python_callable,
            op_args,
            op_kwargs,
        })
    }

    fn payload(&self) -> serde_json::Value {
        json!({
            "python_callable": self.python_callable,
            "op_args": self.op_args.iter().map(yaml_to_json).collect::<Vec<_>>(),
            "op_kwargs": self.op_kwargs.iter()
                .map(|(k, v)| (k.clone(), yaml_to_json(v)))
                .collect::<serde_json::Map<String, serde_json::Value>>(),
        })
    }
}

macro_rules! python_operator {
    ($name:ident, $type_name:literal) => {
        #[derive(Debug)]
        pub struct $name(pub PythonCallable);

        impl $name {
            pub fn from_params(params: &Params) -> Result<Self, String> {
                PythonCallable::from_params(params).map(Self)
            }
        }

        impl Operator for $name {
            fn operator_type(&self) -> &str {
                $type_name
            }

            fn engine_payload(&self) -> serde_json::Value {
                self.0.payload()
            }
        }
    };
}

python_operator!(PythonOperator, "PythonOperator");
python_operator!(BranchPythonOperator, "BranchPythonOperator");
python_operator!(ShortCircuitOperator, "ShortCircuitOperator");

#[derive(Debug)]
pub struct EmailOperator {
    pub to: Vec<String>,
    pub subject: String,
    pub html_content: String,
}

impl EmailOperator {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        let to = str_or_list(params, "to")?
            .ok_or_else(|| "missing required parameter 'to'".to_string())?;
        Ok(Self {
            to,
            subject: optional_str(params, "subject")?
                .unwrap_or_else(|| "Workflow notification".to_string()),
            html_content: optional_str(params, "html_content")?
                .unwrap_or_else(|| "Workflow task notification".to_string()),
        })
    }
}

impl Operator for EmailOperator {
    fn operator_type(&self) -> &str {
        "EmailOperator"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({
            "to": self.to,
            "subject": self.subject,
            "html_content": self.html_content,
        })
    }
}

/// No-op placeholder task, takes no parameters
#[derive(Debug)]
pub struct DummyOperator;

impl DummyOperator {
    pub fn from_params(_params: &Params) -> Result<Self, String> {
        Ok(Self)
    }
}

impl Operator for DummyOperator {
    fn operator_type(&self) -> &str {
        "DummyOperator"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({})
    }
}

#[derive(Debug)]
pub struct FileSensor {
    pub filepath: String,
    pub fs_conn_id: Option<String>,
}

impl FileSensor {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        Ok(Self {
            filepath: require_str(params, "filepath")?,
            fs_conn_id: optional_str(params, "conn_id")?,
        })
    }
}

impl Operator for FileSensor {
    fn operator_type(&self) -> &str {
        "FileSensor"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({ "filepath": self.filepath, "fs_conn_id": self.fs_conn_id })
    }
}

#[derive(Debug)]
pub struct HttpSensor {
    pub endpoint: String,
    pub http_conn_id: Option<String>,
}

impl HttpSensor {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        Ok(Self {
            endpoint: require_str(params, "endpoint")?,
            http_conn_id: optional_str(params, "conn_id")?,
        })
    }
}

impl Operator for HttpSensor {
    fn operator_type(&self) -> &str {
        "HttpSensor"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({ "endpoint": self.endpoint, "http_conn_id": self.http_conn_id })
    }
}

#[derive(Debug)]
pub struct S3KeySensor {
    pub bucket_name: String,
    pub bucket_key: String,
    pub aws_conn_id: Option<String>,
}

impl S3KeySensor {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        Ok(Self {
            bucket_name: require_str(params, "bucket_name")?,
            bucket_key: require_str(params, "bucket_key")?,
            aws_conn_id: optional_str(params, "conn_id")?,
        })
    }
}

impl Operator for S3KeySensor {
    fn operator_type(&self) -> &str {
        "S3KeySensor"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({
            "bucket_name": self.bucket_name,
            "bucket_key": self.bucket_key,
            "aws_conn_id": self.aws_conn_id,
        })
    }
}

#[derive(Debug)]
pub struct SqlSensor {
    pub sql: String,
    pub conn_id: String,
}

impl SqlSensor {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        Ok(Self {
            sql: require_str(params, "sql")?,
            conn_id: require_str(params, "conn_id")?,
        })
    }
}

impl Operator for SqlSensor {
    fn operator_type(&self) -> &str {
        "SqlSensor"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({ "sql": self.sql, "conn_id": self.conn_id })
    }
}

#[derive(Debug)]
pub struct ExternalTaskSensor {
    pub external_dag_id: String,
    pub external_task_id: Option<String>,
}

impl ExternalTaskSensor {
    pub fn from_params(params: &Params) -> Result<Self, String> {
        Ok(Self {
            external_dag_id: require_str(params, "external_dag_id")?,
            external_task_id: optional_str(params, "external_task_id")?,
        })
    }
}

impl Operator for ExternalTaskSensor {
    fn operator_type(&self) -> &str {
        "ExternalTaskSensor"
    }

    fn engine_payload(&self) -> serde_json::Value {
        json!({
            "external_dag_id": self.external_dag_id,
            "external_task_id": self.external_task_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(yaml: &str) -> Params {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn bash_requires_command() {
        let op = BashOperator::from_params(&params(r#"{bash_command: "echo hi"}"#)).unwrap();
        assert_eq!(op.bash_command, "echo hi");

        let err = BashOperator::from_params(&params("{}")).unwrap_err();
        assert!(err.contains("bash_command"));
    }

    #[test]
    fn bash_rejects_non_string_command() {
        let err = BashOperator::from_params(&params("{bash_command: 42}")).unwrap_err();
        assert!(err.contains("must be a string"));
    }

    #[test]
    fn python_family_shares_callable_shape() {
        let p = params(
            r#"
python_callable: etl.transform
op_args: [1, two]
op_kwargs: {batch: 10}
"#,
        );
        let op = PythonOperator::from_params(&p).unwrap();
        assert_eq!(op.0.python_callable, "etl.transform");
        assert_eq!(op.0.op_args.len(), 2);
        assert_eq!(op.0.op_kwargs["batch"].as_u64(), Some(10));

        assert!(BranchPythonOperator::from_params(&p).is_ok());
        assert!(ShortCircuitOperator::from_params(&params("{}")).is_err());
    }

    #[test]
    fn email_normalizes_to_list_and_defaults() {
        let op = EmailOperator::from_params(&params(r#"{to: "ops@example.com"}"#)).unwrap();
        assert_eq!(op.to, vec!["ops@example.com"]);
        assert_eq!(op.subject, "Workflow notification");

        let op =
            EmailOperator::from_params(&params(r#"{to: [a@x.com, b@x.com], subject: Done}"#))
                .unwrap();
        assert_eq!(op.to.len(), 2);
        assert_eq!(op.subject, "Done");
    }

    #[test]
    fn sensors_validate_required_params() {
        assert!(FileSensor::from_params(&params("{filepath: /tmp/x}")).is_ok());
        assert!(HttpSensor::from_params(&params("{}")).is_err());

        let err = S3KeySensor::from_params(&params("{bucket_name: b}")).unwrap_err();
        assert!(err.contains("bucket_key"));

        let err = SqlSensor::from_params(&params("{sql: 'select 1'}")).unwrap_err();
        assert!(err.contains("conn_id"));
    }

    #[test]
    fn dummy_ignores_parameters() {
        let op = DummyOperator::from_params(&params("{anything: goes}")).unwrap();
        assert_eq!(op.engine_payload(), serde_json::json!({}));
    }

    #[test]
    fn payload_carries_connection_ids() {
        let op = FileSensor::from_params(&params("{filepath: /data, conn_id: fs_default}"))
            .unwrap();
        assert_eq!(op.engine_payload()["fs_conn_id"], "fs_default");
    }
}
