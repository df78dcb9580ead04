//! 推論結果（クラス確率とラベル）

use serde::Serialize;

/// 陽性クラスのフォルダ名・ラベル名
pub const POSITIVE_CLASS: &str = "formalin";

/// 陰性クラスのラベル名
pub const NEGATIVE_CLASS: &str = "non formalin";

/// クラス名（ラベルID順: 0 = non formalin, 1 = formalin）
pub const CLASS_NAMES: [&str; 2] = [NEGATIVE_CLASS, POSITIVE_CLASS];

/// 判定しきい値（formalin の確率がこれを超えたら陽性）
pub const THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassLabel {
    #[serde(rename = "formalin")]
    Formalin,
    #[serde(rename = "non formalin")]
    NonFormalin,
}

impl ClassLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Formalin => POSITIVE_CLASS,
            ClassLabel::NonFormalin => NEGATIVE_CLASS,
        }
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 2クラスの確率
///
/// モデルの出力は1ユニットのSigmoidなので、`non_formalin` は `1 - formalin` になります。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    pub formalin: f32,
    pub non_formalin: f32,
}

impl ClassProbabilities {
    pub fn new(formalin: f32, non_formalin: f32) -> Self {
        Self {
            formalin,
            non_formalin,
        }
    }

    /// Sigmoid出力 P(formalin) から生成
    pub fn from_sigmoid(p: f32) -> Self {
        Self::new(p, 1.0 - p)
    }

    /// `formalin > 0.5` なら陽性。ちょうど 0.5 は陰性。
    pub fn label(&self) -> ClassLabel {
        if self.formalin > THRESHOLD {
            ClassLabel::Formalin
        } else {
            ClassLabel::NonFormalin
        }
    }
}

/// 確率を百分率の文字列に変換（小数点以下2桁、四捨五入）
pub fn format_percentage(value: f32) -> String {
    format!("{:.2}%", f64::from(value) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        assert_eq!(ClassProbabilities::new(0.9, 0.1).label(), ClassLabel::Formalin);
        assert_eq!(ClassProbabilities::new(0.51, 0.0).label(), ClassLabel::Formalin);
        assert_eq!(ClassProbabilities::new(0.2, 0.8).label(), ClassLabel::NonFormalin);
        // 第2出力は判定に使わない
        assert_eq!(ClassProbabilities::new(0.4, 0.1).label(), ClassLabel::NonFormalin);
    }

    #[test]
    fn test_threshold_boundary_is_negative() {
        assert_eq!(ClassProbabilities::new(0.5, 0.5).label(), ClassLabel::NonFormalin);
        assert_eq!(ClassProbabilities::from_sigmoid(0.5).label(), ClassLabel::NonFormalin);
    }

    #[test]
    fn test_from_sigmoid() {
        let probs = ClassProbabilities::from_sigmoid(0.75);
        assert_eq!(probs.formalin, 0.75);
        assert_eq!(probs.non_formalin, 0.25);
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.6789), "67.89%");
        assert_eq!(format_percentage(0.9), "90.00%");
        assert_eq!(format_percentage(0.1), "10.00%");
        assert_eq!(format_percentage(0.0), "0.00%");
        assert_eq!(format_percentage(1.0), "100.00%");
        // 切り捨てではなく丸め
        assert_eq!(format_percentage(0.12346), "12.35%");
    }

    #[test]
    fn test_label_names() {
        assert_eq!(ClassLabel::Formalin.to_string(), "formalin");
        assert_eq!(ClassLabel::NonFormalin.to_string(), "non formalin");
        assert_eq!(
            serde_json::to_string(&ClassLabel::NonFormalin).unwrap(),
            "\"non formalin\""
        );
        assert_eq!(CLASS_NAMES[1], POSITIVE_CLASS);
    }
}
