//! Synthetic Chinese patient records for demos and corpus tests
//!
//! Every record embeds a known set of identifiers, returned alongside the
//! text so callers can check that anonymization removed them.

use fake::faker::name::zh_cn::FirstName;
use fake::Fake;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SURNAMES: &[&str] = &[
    "张", "王", "李", "赵", "陈", "刘", "杨", "黄", "周", "吴", "徐", "孙", "马", "朱", "胡", "林",
];

const FALLBACK_GIVEN_NAMES: &[&str] = &["伟", "芳", "秀英", "敏", "静", "建国", "丽", "强"];

const CITIES: &[(&str, &[&str])] = &[
    ("北京市", &["朝阳区", "海淀区", "东城区"]),
    ("上海市", &["浦东新区", "徐汇区", "静安区"]),
    ("广东省广州市", &["天河区", "越秀区"]),
    ("浙江省杭州市", &["西湖区", "滨江区"]),
    ("四川省成都市", &["武侯区", "锦江区"]),
];

const ROADS: &[&str] = &["建国路", "人民路", "解放路", "中山路", "文一路", "长江路"];

const COMPLAINTS: &[&str] = &[
    "反复咳嗽两周，伴低热",
    "头晕乏力三天",
    "上腹部疼痛一周，进食后加重",
    "胸闷气短半月",
];

const DIAGNOSES: &[&str] = &["高血压", "糖尿病", "慢性胃炎", "支气管炎", "冠心病"];

const MEDICINES: &[&str] = &["阿莫西林胶囊", "二甲双胍片", "硝苯地平缓释片", "奥美拉唑肠溶胶囊"];

/// Identifiers planted in a generated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantedValues {
    pub name: String,
    pub id_card: String,
    pub outpatient_no: String,
    pub inpatient_no: String,
    pub address: String,
    pub phone: String,
    pub bank_card: String,
    pub settlement_no: String,
    pub visit_time: String,
}

impl PlantedValues {
    /// Values that the default recognizers are expected to remove entirely.
    pub fn identifiers(&self) -> Vec<&str> {
        vec![
            &self.name,
            &self.id_card,
            &self.outpatient_no,
            &self.inpatient_no,
            &self.address,
            &self.phone,
            &self.bank_card,
            &self.settlement_no,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub text: String,
    pub planted: PlantedValues,
}

#[derive(Clone)]
pub struct EhrGenerator {
    rng: StdRng,
}

impl EhrGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn generate_batch(&mut self, count: usize) -> Vec<PatientRecord> {
        (0..count).map(|_| self.generate()).collect()
    }

    pub fn generate(&mut self) -> PatientRecord {
        let birth = (
            self.rng.gen_range(1940..=2015),
            self.rng.gen_range(1..=12u32),
            self.rng.gen_range(1..=28u32),
        );
        let visit = (
            self.rng.gen_range(2022..=2024),
            self.rng.gen_range(1..=12u32),
            self.rng.gen_range(1..=28u32),
            self.rng.gen_range(7..=20u32),
            self.rng.gen_range(0..60u32),
            self.rng.gen_range(0..60u32),
        );

        let planted = PlantedValues {
            name: self.name(),
            id_card: self.id_card(birth),
            outpatient_no: format!("MZ{}", self.rng.gen_range(10_000_000..=99_999_999u32)),
            inpatient_no: format!("ZY{}", self.rng.gen_range(10_000_000..=99_999_999u32)),
            address: self.address(),
            phone: self.phone(),
            bank_card: format!("62{}", self.digits(14)),
            settlement_no: self.settlement_no(),
            visit_time: format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                visit.0, visit.1, visit.2, visit.3, visit.4, visit.5
            ),
        };

        let complaint = *COMPLAINTS.choose(&mut self.rng).unwrap_or(&COMPLAINTS[0]);
        let diagnosis = *DIAGNOSES.choose(&mut self.rng).unwrap_or(&DIAGNOSES[0]);
        let medicine = *MEDICINES.choose(&mut self.rng).unwrap_or(&MEDICINES[0]);
        let temperature = self.rng.gen_range(36.5..37.5);
        let systolic = self.rng.gen_range(110..=140);
        let diastolic = self.rng.gen_range(70..=90);
        let registration_fee = self.rng.gen_range(10.0..50.0);
        let drug_fee = self.rng.gen_range(100.0..800.0);
        let total = registration_fee + drug_fee;
        let wbc = self.rng.gen_range(4.0..10.0);

        let text = format!(
            "# 1. 个人身份信息\n\
             姓名: {name}\n\
             身份证号: {id_card}\n\
             门诊号: {outpatient}\n\
             住院号: {inpatient}\n\
             住址: {address}\n\
             电话号码: {phone}\n\
             \n\
             # 2. 病史与报告\n\
             门诊病历: 患者主诉：{complaint}。\n\
             体检报告: 体温：{temperature:.1}°C，血压：{systolic}/{diastolic}mmHg。\n\
             诊断结果: 初步诊断：{diagnosis}。\n\
             用药史: 长期服用{medicine}，每日两次。\n\
             \n\
             # 3. 财务与医保信息\n\
             银行卡号: {bank_card}\n\
             缴费记录: 项目: 挂号费, 金额: {registration_fee:.2}元; 项目: 药品费, 金额: {drug_fee:.2}元\n\
             结算单号: {settlement}, 总金额: {total:.2}元\n\
             \n\
             # 4. 就诊信息\n\
             就诊时间: {visit_time}\n\
             项目名称: 血常规, 结果: 白细胞计数 {wbc:.1}x10^9/L\n\
             项目名称: 尿常规, 结果: 蛋白质阴性\n",
            name = planted.name,
            id_card = planted.id_card,
            outpatient = planted.outpatient_no,
            inpatient = planted.inpatient_no,
            address = planted.address,
            phone = planted.phone,
            bank_card = planted.bank_card,
            settlement = planted.settlement_no,
            visit_time = planted.visit_time,
        );

        debug!("Generated synthetic record for {}", planted.name);
        PatientRecord { text, planted }
    }

    fn name(&mut self) -> String {
        let surname = *SURNAMES.choose(&mut self.rng).unwrap_or(&SURNAMES[0]);
        let generated: String = FirstName().fake_with_rng(&mut self.rng);
        let mut given: String = generated.chars().filter(|c| is_han(*c)).take(2).collect();
        if given.is_empty() {
            given = FALLBACK_GIVEN_NAMES
                .choose(&mut self.rng)
                .unwrap_or(&FALLBACK_GIVEN_NAMES[0])
                .to_string();
        }
        format!("{}{}", surname, given)
    }

    fn id_card(&mut self, (year, month, day): (u32, u32, u32)) -> String {
        let region = self.rng.gen_range(110_000..=659_009u32);
        let sequence = self.rng.gen_range(100..=999u32);
        let checksum = *b"0123456789X"
            .choose(&mut self.rng)
            .unwrap_or(&b'0') as char;
        format!(
            "{}{:04}{:02}{:02}{}{}",
            region, year, month, day, sequence, checksum
        )
    }

    fn address(&mut self) -> String {
        let (city, districts) = *CITIES.choose(&mut self.rng).unwrap_or(&CITIES[0]);
        let district = *districts.choose(&mut self.rng).unwrap_or(&districts[0]);
        let road = *ROADS.choose(&mut self.rng).unwrap_or(&ROADS[0]);
        let number = self.rng.gen_range(1..=300);
        format!("{}{}{}{}号", city, district, road, number)
    }

    fn phone(&mut self) -> String {
        format!("1{}{}", self.rng.gen_range(3..=9u32), self.digits(9))
    }

    fn settlement_no(&mut self) -> String {
        let bytes: [u8; 16] = self.rng.gen();
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string()
    }

    fn digits(&mut self, count: usize) -> String {
        (0..count)
            .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
            .collect()
    }
}

fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}
