//! 템플릿 생성용 시스템 지시문
//!
//! 지시문 = 접두 지시 + few-shot 예시 + 접미 지시

const PREFIX: &str = "You analyze manufacturing blueprints.
Given a blueprint image and the part's measured features, identify every alphabet that labels a dimension in the drawing.
Use the features to decide what each dimension means and give each alphabet a short title.
Keep sentences short and precise.";

const SUFFIX: &str = "Do not use bold markers.
Follow the format of the examples exactly.
Report every dimension through the DimensionalInfo tool, one call per alphabet.";

/// few-shot 예시 (부품 설명 형식)
pub const FEW_SHOT_EXAMPLES: &[&str] = &[
    "##Part name:Wing Nut_Type 1_M2\n\n##Classification:Nut>Wing Nut>Type 1\n\n##Dimensional Information:\nWidth: 4.0(A')\nHeight: 3.0(B')\nThickness: 2.0(C)\nTotal Length: 12.0(D)\nTotal Height: 6.0(H)\nHole Diameter: 2.5(G1)",
    "##Part name:Stud Bolt_Type 1_M10x16\n\n##Classification:Bolt>Stud Bolt>Type 1\n\n##Dimensional Information:\nDiameter: 10.0(D)\nHead Diameter: 20.0(B)\nLength: 16.0(Bm)\nHead Height: 12.0(Z)\nHead Angle: 1.5(La)\nHead Length: 2.0(L)",
];

/// few-shot 예시를 포함한 시스템 지시문 생성
pub fn build_system_message<S: AsRef<str>>(examples: &[S]) -> String {
    let mut message = String::from(PREFIX);
    message.push_str("\n\n");
    for example in examples {
        message.push_str(example.as_ref());
        message.push_str("\n\n");
    }
    message.push_str(SUFFIX);
    message
}
