//! Compiled-in recognizer tables for Chinese clinical and financial text.
//!
//! Each built-in is plain data (entity type, patterns, context keywords)
//! turned into a [`Recognizer`] on demand. [`RecognizerKind`] is the tag
//! used by profiles to refer to them.

use crate::error::{DeidError, DeidResult};
use crate::pattern::Pattern;
use crate::recognizer::Recognizer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LANGUAGE: &str = "zh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    IdCard,
    Phone,
    Person,
    Address,
    BankCard,
    Inpatient,
    Outpatient,
    Settlement,
    PaymentAmount,
    PaymentPassword,
    DateTime,
    MedicalTest,
    Dynamic,
}

impl RecognizerKind {
    /// Built-in kinds in default registration order.
    pub const BUILTIN: [RecognizerKind; 12] = [
        RecognizerKind::IdCard,
        RecognizerKind::Phone,
        RecognizerKind::Person,
        RecognizerKind::Inpatient,
        RecognizerKind::Outpatient,
        RecognizerKind::Address,
        RecognizerKind::BankCard,
        RecognizerKind::Settlement,
        RecognizerKind::PaymentPassword,
        RecognizerKind::PaymentAmount,
        RecognizerKind::DateTime,
        RecognizerKind::MedicalTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecognizerKind::IdCard => "id_card",
            RecognizerKind::Phone => "phone",
            RecognizerKind::Person => "person",
            RecognizerKind::Address => "address",
            RecognizerKind::BankCard => "bank_card",
            RecognizerKind::Inpatient => "inpatient",
            RecognizerKind::Outpatient => "outpatient",
            RecognizerKind::Settlement => "settlement",
            RecognizerKind::PaymentAmount => "payment_amount",
            RecognizerKind::PaymentPassword => "payment_password",
            RecognizerKind::DateTime => "date_time",
            RecognizerKind::MedicalTest => "medical_test",
            RecognizerKind::Dynamic => "dynamic",
        }
    }

    /// Table entry for a built-in kind; `None` for `Dynamic`.
    pub fn table(&self) -> Option<&'static BuiltinRecognizer> {
        BUILTIN_RECOGNIZERS.iter().find(|builtin| builtin.kind == *self)
    }
}

impl fmt::Display for RecognizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecognizerKind {
    type Err = DeidError;

    /// Accepts the snake_case tag or the entity type name
    /// (`"id_card"` or `"ID_CARD"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        let kind = match tag.as_str() {
            "id_card" => RecognizerKind::IdCard,
            "phone" | "phone_number" => RecognizerKind::Phone,
            "person" => RecognizerKind::Person,
            "address" => RecognizerKind::Address,
            "bank_card" => RecognizerKind::BankCard,
            "inpatient" | "inpatient_no" => RecognizerKind::Inpatient,
            "outpatient" | "outpatient_no" => RecognizerKind::Outpatient,
            "settlement" | "settlement_no" => RecognizerKind::Settlement,
            "payment_amount" => RecognizerKind::PaymentAmount,
            "payment_password" => RecognizerKind::PaymentPassword,
            "date_time" | "datetime" => RecognizerKind::DateTime,
            "medical_test" => RecognizerKind::MedicalTest,
            "dynamic" => RecognizerKind::Dynamic,
            _ => return Err(DeidError::UnknownRecognizerKind(s.to_string())),
        };
        Ok(kind)
    }
}

pub struct BuiltinPattern {
    pub name: &'static str,
    pub regex: &'static str,
    pub score: f64,
}

pub struct BuiltinRecognizer {
    pub kind: RecognizerKind,
    pub entity_type: &'static str,
    pub patterns: &'static [BuiltinPattern],
    pub context: &'static [&'static str],
}

impl BuiltinRecognizer {
    pub fn build(&self) -> DeidResult<Recognizer> {
        let patterns = self
            .patterns
            .iter()
            .map(|p| Pattern::new(p.name, p.regex, p.score))
            .collect::<DeidResult<Vec<_>>>()?;

        Recognizer::new(
            self.kind.as_str(),
            self.entity_type,
            Some(DEFAULT_LANGUAGE.to_string()),
            patterns,
            self.context.iter().map(|c| c.to_string()).collect(),
        )
    }
}

pub static BUILTIN_RECOGNIZERS: &[BuiltinRecognizer] = &[
    BuiltinRecognizer {
        kind: RecognizerKind::IdCard,
        entity_type: "ID_CARD",
        patterns: &[BuiltinPattern {
            name: "id_card",
            regex: r"\b[1-9]\d{5}(?:19|20)\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])\d{3}[\dXx]\b",
            score: 0.95,
        }],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::Phone,
        entity_type: "PHONE_NUMBER",
        patterns: &[
            BuiltinPattern {
                name: "CHINESE_PHONE_PATTERN",
                regex: r"\b1[3-9]\d{9}\b",
                score: 0.9,
            },
            BuiltinPattern {
                name: "CHINESE_PHONE_WITH_SPACES",
                regex: r"\b1[3-9]\d\s?\d{4}\s?\d{4}\b",
                score: 0.8,
            },
            BuiltinPattern {
                name: "CHINESE_PHONE_WITH_DASHES",
                regex: r"\b1[3-9]\d-\d{4}-\d{4}\b",
                score: 0.8,
            },
        ],
        context: &[
            "电话", "手机", "联系方式", "手机号", "电话号码", "联系电话", "phone", "mobile", "tel",
            "contact",
        ],
    },
    // The surname class lists fifty common single-character surnames.
    BuiltinRecognizer {
        kind: RecognizerKind::Person,
        entity_type: "PERSON",
        patterns: &[
            BuiltinPattern {
                name: "CHINESE_NAME_PATTERN",
                regex: r"\b[张王李赵陈刘杨黄周吴徐孙马朱胡林郭何高罗郑梁谢宋唐许邓冯韩曹彭曾萧田董潘袁于蒋蔡余杜叶程魏苏吕丁任沈][\x{4e00}-\x{9fff}]{1,2}\b",
                score: 0.8,
            },
            BuiltinPattern {
                name: "CHINESE_THREE_CHAR_NAME",
                regex: r"\b[\x{4e00}-\x{9fff}]{3}\b",
                score: 0.6,
            },
            BuiltinPattern {
                name: "CHINESE_TWO_CHAR_NAME",
                regex: r"\b[张王李赵陈刘杨黄周吴徐孙马朱胡林郭何高罗郑梁谢宋唐许邓冯韩曹彭曾萧田董潘袁于蒋蔡余杜叶程魏苏吕丁任沈][\x{4e00}-\x{9fff}]\b",
                score: 0.7,
            },
        ],
        context: &[
            "姓名", "名字", "称呼", "患者", "病人", "先生", "女士", "同志", "name", "patient",
            "person", "mr", "ms", "男", "女",
        ],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::Inpatient,
        entity_type: "INPATIENT_NO",
        patterns: &[
            BuiltinPattern {
                name: "inpatient",
                regex: r"\bZY\d{6,10}\b",
                score: 0.8,
            },
            BuiltinPattern {
                name: "inpatient_chinese",
                regex: r"\b住院\d{6,10}\b",
                score: 0.8,
            },
        ],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::Outpatient,
        entity_type: "OUTPATIENT_NO",
        patterns: &[
            BuiltinPattern {
                name: "outpatient",
                regex: r"\bMZ\d{6,10}\b",
                score: 0.8,
            },
            BuiltinPattern {
                name: "outpatient_chinese",
                regex: r"\b门诊\d{6,10}\b",
                score: 0.8,
            },
        ],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::Address,
        entity_type: "ADDRESS",
        patterns: &[BuiltinPattern {
            name: "chinese_address",
            regex: r"[\x{4e00}-\x{9fff}]{1,5}(?:省|自治区|市|县|区|镇|乡|村|街道|路|巷|弄)[\x{4e00}-\x{9fff}0-9a-zA-Z\-]+",
            score: 0.85,
        }],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::BankCard,
        entity_type: "BANK_CARD",
        patterns: &[
            BuiltinPattern {
                name: "bank_card",
                regex: r"\b(?:62\d{14,17}|94\d{14,17}|35\d{14,17}|5[1-5]\d{14}|4\d{15})\b",
                score: 0.85,
            },
            BuiltinPattern {
                name: "bank_card_with_spaces",
                regex: r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4,7}\b",
                score: 0.75,
            },
        ],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::Settlement,
        entity_type: "SETTLEMENT_NO",
        patterns: &[
            BuiltinPattern {
                name: "settlement_receipt",
                regex: r"\b[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}\b",
                score: 0.85,
            },
            BuiltinPattern {
                name: "settlement_receipt_chinese",
                regex: r"\b结算单号[:：]\s*[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}\b",
                score: 0.9,
            },
        ],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::PaymentPassword,
        entity_type: "PAYMENT_PASSWORD",
        patterns: &[BuiltinPattern {
            name: "payment_password",
            regex: r"\b\d{6}\b",
            score: 0.85,
        }],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::PaymentAmount,
        entity_type: "PAYMENT_AMOUNT",
        patterns: &[
            BuiltinPattern {
                name: "payment_amount_yuan",
                regex: r"\b(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?\s*元",
                score: 0.95,
            },
            BuiltinPattern {
                name: "payment_amount_rmb",
                regex: r"\b(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?\s*人民币",
                score: 0.95,
            },
            BuiltinPattern {
                name: "payment_amount_symbol",
                regex: r"[¥￥](?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?",
                score: 0.95,
            },
        ],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::DateTime,
        entity_type: "DATE_TIME",
        patterns: &[
            BuiltinPattern {
                name: "chinese_date",
                regex: r"\b\d{4}年\d{1,2}月\d{1,2}日|\b\d{4}[-/]\d{1,2}[-/]\d{1,2}\b",
                score: 0.85,
            },
            BuiltinPattern {
                name: "chinese_time",
                regex: r"\b\d{1,2}[:：]\d{1,2}(?::\d{1,2})?\b|\b\d{1,2}点\d{1,2}分(?:\d{1,2}秒)?",
                score: 0.8,
            },
            BuiltinPattern {
                name: "chinese_datetime",
                regex: r"\b\d{4}年\d{1,2}月\d{1,2}日\s*\d{1,2}[:：]\d{1,2}\b|\b\d{4}[-/]\d{1,2}[-/]\d{1,2}\s+\d{1,2}[:：]\d{1,2}\b",
                score: 0.9,
            },
        ],
        context: &[],
    },
    BuiltinRecognizer {
        kind: RecognizerKind::MedicalTest,
        entity_type: "MEDICAL_TEST",
        patterns: &[BuiltinPattern {
            name: "medical_test",
            regex: r"血常规|尿常规|心电图|X光|CT|MRI|B超|血糖|血压|体温",
            score: 0.95,
        }],
        context: &[],
    },
];

/// Replacement tokens used when no profile supplies its own.
pub fn default_replacements() -> Vec<(&'static str, &'static str)> {
    vec![
        ("PERSON", "<NAME>"),
        ("PHONE_NUMBER", "<PHONE>"),
        ("ID_CARD", "<ID_CARD>"),
        ("ADDRESS", "<ADDRESS>"),
        ("BANK_CARD", "<BANK_CARD>"),
        ("INPATIENT_NO", "<INPATIENT>"),
        ("OUTPATIENT_NO", "<OUTPATIENT>"),
        ("SETTLEMENT_NO", "<SETTLEMENT>"),
        ("PAYMENT_AMOUNT", "<AMOUNT>"),
        ("PAYMENT_PASSWORD", "<PASSWORD>"),
        ("DATE_TIME", "<DATE_TIME>"),
        ("MEDICAL_TEST", "<MEDICAL_TEST>"),
    ]
}
