use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const PAGE_ID_FIELD: &str = "pageId";

/// `visit/*` 与 `bookmark/*` 下的两种历史值形态。
///
/// - Bare：旧格式，值本身就是 pageId 字符串
/// - Structured：`{pageId, ...meta}`
///
/// 只能通过 [`TimestampValue::classify`] 区分形态；下游一律读 [`Normalized`]。
#[derive(Clone, Debug, PartialEq)]
pub enum TimestampValue {
    Bare(String),
    Structured {
        page_id: String,
        meta: Map<String, Value>,
    },
}

/// 归一化后的时间戳记录
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    #[serde(rename = "pageId")]
    pub page_id: String,
    pub meta: Map<String, Value>,
}

impl TimestampValue {
    /// 判别存储值形态；既不是字符串也不是带字符串 pageId 的对象时返回 None。
    pub fn classify(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(TimestampValue::Bare(id.clone())),
            Value::Object(obj) => {
                let page_id = obj.get(PAGE_ID_FIELD)?.as_str()?.to_string();
                let meta = obj
                    .iter()
                    .filter(|(k, _)| k.as_str() != PAGE_ID_FIELD)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some(TimestampValue::Structured { page_id, meta })
            }
            _ => None,
        }
    }

    pub fn page_id(&self) -> &str {
        match self {
            TimestampValue::Bare(id) => id,
            TimestampValue::Structured { page_id, .. } => page_id,
        }
    }

    pub fn into_normalized(self) -> Normalized {
        match self {
            TimestampValue::Bare(page_id) => Normalized {
                page_id,
                meta: Map::new(),
            },
            TimestampValue::Structured { page_id, meta } => Normalized { page_id, meta },
        }
    }

    /// 写入格式：新记录一律写 Structured
    pub fn to_json(&self) -> Value {
        match self {
            TimestampValue::Bare(id) => Value::String(id.clone()),
            TimestampValue::Structured { page_id, meta } => {
                let mut obj = Map::with_capacity(meta.len() + 1);
                obj.insert(PAGE_ID_FIELD.to_string(), Value::String(page_id.clone()));
                for (k, v) in meta {
                    if k != PAGE_ID_FIELD {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                Value::Object(obj)
            }
        }
    }
}

/// 两种历史形态统一为 `{pageId, meta}`，不修改输入。
pub fn normalize(value: &Value) -> Option<Normalized> {
    TimestampValue::classify(value).map(TimestampValue::into_normalized)
}
