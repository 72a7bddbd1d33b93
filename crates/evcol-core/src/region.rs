//! Keyword-table region classification.
//!
//! The table is scanned in order and the first region with a keyword found
//! anywhere in the location text wins. Several keywords are shared between
//! regions (district names such as `중구` or `광주`), so reordering the table
//! changes results.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ParseCodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Seoul,
    Busan,
    Daegu,
    Incheon,
    Gwangju,
    Daejeon,
    Ulsan,
    Sejong,
    Gyeonggi,
    Gangwon,
    Chungbuk,
    Chungnam,
    Jeonbuk,
    Jeonnam,
    Gyeongbuk,
    Gyeongnam,
    Jeju,
    Nationwide,
}

impl Region {
    pub const ALL: [Region; 18] = [
        Region::Seoul,
        Region::Busan,
        Region::Daegu,
        Region::Incheon,
        Region::Gwangju,
        Region::Daejeon,
        Region::Ulsan,
        Region::Sejong,
        Region::Gyeonggi,
        Region::Gangwon,
        Region::Chungbuk,
        Region::Chungnam,
        Region::Jeonbuk,
        Region::Jeonnam,
        Region::Gyeongbuk,
        Region::Gyeongnam,
        Region::Jeju,
        Region::Nationwide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Seoul => "seoul",
            Region::Busan => "busan",
            Region::Daegu => "daegu",
            Region::Incheon => "incheon",
            Region::Gwangju => "gwangju",
            Region::Daejeon => "daejeon",
            Region::Ulsan => "ulsan",
            Region::Sejong => "sejong",
            Region::Gyeonggi => "gyeonggi",
            Region::Gangwon => "gangwon",
            Region::Chungbuk => "chungbuk",
            Region::Chungnam => "chungnam",
            Region::Jeonbuk => "jeonbuk",
            Region::Jeonnam => "jeonnam",
            Region::Gyeongbuk => "gyeongbuk",
            Region::Gyeongnam => "gyeongnam",
            Region::Jeju => "jeju",
            Region::Nationwide => "nationwide",
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Region::Nationwide
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| ParseCodeError {
                kind: "region",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Error)]
pub enum RegionTableError {
    #[error("region table has no entries")]
    Empty,
    #[error("`nationwide` is the fallback and cannot carry keywords")]
    KeywordsOnDefault,
    #[error("region `{0}` appears more than once")]
    DuplicateRegion(Region),
    #[error("reading region table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing region table: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub code: Region,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RegionTableFile {
    regions: Vec<RegionEntry>,
}

/// Ordered region → keyword mapping. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTable {
    entries: Vec<RegionEntry>,
}

impl RegionTable {
    pub fn new(entries: Vec<RegionEntry>) -> Result<Self, RegionTableError> {
        if entries.is_empty() {
            return Err(RegionTableError::Empty);
        }
        let mut seen = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.code.is_default() && !entry.keywords.is_empty() {
                return Err(RegionTableError::KeywordsOnDefault);
            }
            if seen.contains(&entry.code) {
                return Err(RegionTableError::DuplicateRegion(entry.code));
            }
            seen.push(entry.code);
        }
        let entries = entries
            .into_iter()
            .map(|entry| RegionEntry {
                code: entry.code,
                keywords: entry
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, RegionTableError> {
        let file: RegionTableFile = serde_yaml::from_str(text)?;
        Self::new(file.regions)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RegionTableError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegionTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn entries(&self) -> &[RegionEntry] {
        &self.entries
    }
}

fn entry(code: Region, keywords: &[&str]) -> RegionEntry {
    RegionEntry {
        code,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        let entries = vec![
            entry(
                Region::Seoul,
                &[
                    "서울", "seoul", "강남", "홍대", "명동", "종로", "청계천", "여의도", "잠실",
                    "광화문", "이태원", "성수", "코엑스", "coex", "ddp", "동대문", "용산",
                ],
            ),
            entry(
                Region::Busan,
                &["부산", "busan", "해운대", "광안리", "서면", "벡스코", "bexco", "남포동"],
            ),
            entry(
                Region::Daegu,
                &["대구", "daegu", "동성로", "수성못", "엑스코", "exco"],
            ),
            entry(
                Region::Incheon,
                &["인천", "incheon", "송도", "월미도", "영종도", "강화"],
            ),
            entry(Region::Gwangju, &["광주광역시", "광주", "gwangju", "충장로"]),
            entry(Region::Daejeon, &["대전", "daejeon", "유성", "엑스포과학공원"]),
            entry(Region::Ulsan, &["울산", "ulsan", "태화강"]),
            entry(Region::Sejong, &["세종", "sejong"]),
            entry(
                Region::Gyeonggi,
                &[
                    "경기", "gyeonggi", "수원", "suwon", "성남", "고양", "일산", "킨텍스", "kintex",
                    "용인", "부천", "안양", "파주", "가평", "양평",
                ],
            ),
            entry(
                Region::Gangwon,
                &[
                    "강원", "gangwon", "춘천", "chuncheon", "강릉", "gangneung", "속초", "평창",
                    "원주",
                ],
            ),
            entry(
                Region::Chungbuk,
                &["충북", "충청북도", "청주", "cheongju", "충주", "제천"],
            ),
            entry(
                Region::Chungnam,
                &["충남", "충청남도", "천안", "cheonan", "아산", "공주", "보령", "부여"],
            ),
            entry(
                Region::Jeonbuk,
                &["전북", "전라북도", "전주", "jeonju", "군산", "익산", "남원"],
            ),
            entry(
                Region::Jeonnam,
                &["전남", "전라남도", "여수", "yeosu", "순천", "목포", "mokpo", "담양"],
            ),
            entry(
                Region::Gyeongbuk,
                &["경북", "경상북도", "경주", "gyeongju", "포항", "pohang", "안동", "andong"],
            ),
            entry(
                Region::Gyeongnam,
                &["경남", "경상남도", "창원", "changwon", "통영", "진주", "김해", "거제"],
            ),
            entry(Region::Jeju, &["제주", "jeju", "서귀포"]),
        ];
        // The built-in table is static data; it satisfies `new`'s checks.
        Self {
            entries: entries
                .into_iter()
                .map(|e| RegionEntry {
                    code: e.code,
                    keywords: e.keywords.into_iter().map(|k| k.to_lowercase()).collect(),
                })
                .collect(),
        }
    }
}

/// Maps free-text locations to region codes using an injected table.
#[derive(Debug, Clone, Default)]
pub struct RegionClassifier {
    table: RegionTable,
}

impl RegionClassifier {
    pub fn new(table: RegionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    pub fn classify(&self, location: &str) -> Region {
        let haystack = location.trim().to_lowercase();
        if haystack.is_empty() {
            return Region::Nationwide;
        }
        self.table
            .entries
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|entry| entry.code)
            .unwrap_or(Region::Nationwide)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_hangul_and_romanized_locations() {
        let classifier = RegionClassifier::default();
        assert_eq!(classifier.classify("서울 청계천"), Region::Seoul);
        assert_eq!(classifier.classify("BEXCO Exhibition Hall 1"), Region::Busan);
        assert_eq!(classifier.classify("제주특별자치도 서귀포시"), Region::Jeju);
        assert_eq!(classifier.classify("수원화성 행궁광장"), Region::Gyeonggi);
    }

    #[test]
    fn blank_or_unknown_locations_fall_back_to_nationwide() {
        let classifier = RegionClassifier::default();
        assert_eq!(classifier.classify(""), Region::Nationwide);
        assert_eq!(classifier.classify("   "), Region::Nationwide);
        assert_eq!(classifier.classify("온라인 접수"), Region::Nationwide);
    }

    #[test]
    fn earlier_regions_win_shared_keywords() {
        let table = RegionTable::from_yaml_str(
            "regions:\n  - code: busan\n    keywords: [\"중구\"]\n  - code: daegu\n    keywords: [\"중구\", \"동성로\"]\n",
        )
        .unwrap();
        let classifier = RegionClassifier::new(table);
        assert_eq!(classifier.classify("중구 문화회관"), Region::Busan);
        assert_eq!(classifier.classify("동성로 중구"), Region::Busan);
        assert_eq!(classifier.classify("동성로 광장"), Region::Daegu);

        let swapped = RegionTable::from_yaml_str(
            "regions:\n  - code: daegu\n    keywords: [\"중구\"]\n  - code: busan\n    keywords: [\"중구\"]\n",
        )
        .unwrap();
        assert_eq!(
            RegionClassifier::new(swapped).classify("중구 문화회관"),
            Region::Daegu
        );
    }

    #[test]
    fn classification_is_repeatable() {
        let classifier = RegionClassifier::default();
        let first = classifier.classify("광주 충장로 일대");
        for _ in 0..5 {
            assert_eq!(classifier.classify("광주 충장로 일대"), first);
        }
        assert_eq!(first, Region::Gwangju);
    }

    #[test]
    fn table_loading_rejects_bad_shapes() {
        assert!(matches!(
            RegionTable::new(Vec::new()),
            Err(RegionTableError::Empty)
        ));
        assert!(matches!(
            RegionTable::from_yaml_str(
                "regions:\n  - code: nationwide\n    keywords: [\"전국\"]\n"
            ),
            Err(RegionTableError::KeywordsOnDefault)
        ));
        assert!(matches!(
            RegionTable::from_yaml_str(
                "regions:\n  - code: jeju\n    keywords: [a]\n  - code: jeju\n    keywords: [b]\n"
            ),
            Err(RegionTableError::DuplicateRegion(Region::Jeju))
        ));
    }
}
