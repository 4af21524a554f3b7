//! 能力匹配：Worker 能力标签与请求所需技能的匹配度

/// 计算匹配度，结果在 [0, 1]
///
/// 所需技能为空时返回 1.0；否则为「被匹配的技能数 / 所需技能数」，
/// 技能匹配指它（忽略大小写）是任一能力标签的子串。
pub fn match_capabilities<S: AsRef<str>>(capabilities: &[S], required_skills: &[String]) -> f64 {
    if required_skills.is_empty() {
        return 1.0;
    }

    let caps: Vec<String> = capabilities
        .iter()
        .map(|c| c.as_ref().to_lowercase())
        .collect();

    let matched = required_skills
        .iter()
        .filter(|skill| {
            let skill = skill.to_lowercase();
            caps.iter().any(|cap| cap.contains(&skill))
        })
        .count();

    matched as f64 / required_skills.len() as f64
}
