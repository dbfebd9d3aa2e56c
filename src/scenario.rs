//! Per-scenario configuration: keyword libraries, locale markers, citation
//! patterns, and prompt personas.
//!
//! The pipeline logic is language-neutral; everything locale- or
//! domain-specific lives here. Built-in configurations cover the `tender`
//! and `enterprise` scenarios the system shipped with (Chinese corpora);
//! unknown scenario IDs get a generic configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scenario-specific configuration consumed by the routing agent, the
/// verifier, and answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario identifier this configuration belongs to.
    pub scenario_id: String,
    /// Display name used inside prompts.
    pub display_name: String,
    /// System prompt persona for answer generation.
    pub system_prompt: String,
    /// Keyword library: category → words. Used to augment LLM-extracted
    /// keywords and to drive the rule-based analysis fallback.
    pub keyword_library: BTreeMap<String, Vec<String>>,
    /// Markers that classify a question as `guidance` in the fallback.
    pub guidance_markers: Vec<String>,
    /// Markers that classify a question as `analysis` in the fallback.
    pub analysis_markers: Vec<String>,
    /// Substrings indicating a chunk continues elsewhere.
    pub continuation_markers: Vec<String>,
    /// Suffixes (besides ellipsis) that mark a chunk as cut off mid-sentence.
    pub non_terminal_suffixes: Vec<String>,
    /// Ordered citation regex patterns. The first capture group is the
    /// citation token; patterns without a group use the whole match.
    pub citation_patterns: Vec<String>,
}

impl ScenarioConfig {
    /// Returns the built-in configuration for a scenario ID.
    ///
    /// `tender` and `enterprise` carry the domain keyword libraries the
    /// system shipped with; anything else gets [`ScenarioConfig::generic`].
    #[must_use]
    pub fn builtin(scenario_id: &str) -> Self {
        match scenario_id {
            "tender" => Self::tender(),
            "enterprise" => Self::enterprise(),
            other => Self::generic(other),
        }
    }

    /// Tender/bidding scenario.
    #[must_use]
    pub fn tender() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            "budget".to_string(),
            words(&["预算", "报价", "价格", "金额", "资金", "费用", "成本"]),
        );
        keywords.insert(
            "deadline".to_string(),
            words(&["截止", "期限", "时间", "日期", "提交", "开标"]),
        );
        keywords.insert(
            "requirement".to_string(),
            words(&["要求", "条件", "资格", "标准", "规定", "必须"]),
        );
        keywords.insert(
            "technical".to_string(),
            words(&["技术", "规格", "参数", "性能", "指标", "配置"]),
        );
        keywords.insert(
            "qualification".to_string(),
            words(&["资质", "证书", "许可", "认证", "业绩"]),
        );
        keywords.insert(
            "procedure".to_string(),
            words(&["流程", "程序", "步骤", "方式", "方法"]),
        );

        Self {
            scenario_id: "tender".to_string(),
            display_name: "tender and bidding".to_string(),
            system_prompt: "You are a professional tender and bidding analyst. Answer \
                            strictly from the provided tender documents, state time \
                            limits and procedures precisely, and flag compliance \
                            concerns where relevant."
                .to_string(),
            keyword_library: keywords,
            ..Self::generic("tender")
        }
    }

    /// Enterprise-management scenario.
    #[must_use]
    pub fn enterprise() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            "policy".to_string(),
            words(&["政策", "制度", "规定", "条例", "办法"]),
        );
        keywords.insert(
            "process".to_string(),
            words(&["流程", "步骤", "程序", "办理", "申请"]),
        );
        keywords.insert(
            "benefit".to_string(),
            words(&["福利", "待遇", "补贴", "保险", "假期"]),
        );
        keywords.insert(
            "training".to_string(),
            words(&["培训", "学习", "发展", "晋升", "考核"]),
        );
        keywords.insert(
            "hr".to_string(),
            words(&["人力", "招聘", "薪酬", "绩效", "考勤"]),
        );
        keywords.insert(
            "finance".to_string(),
            words(&["财务", "报销", "预算", "费用", "审批"]),
        );

        Self {
            scenario_id: "enterprise".to_string(),
            display_name: "enterprise management".to_string(),
            system_prompt: "You are a professional enterprise management consultant. \
                            Answer from the provided policy documents, cite the \
                            applicable rules, and keep guidance actionable."
                .to_string(),
            keyword_library: keywords,
            ..Self::generic("enterprise")
        }
    }

    /// Generic configuration for unknown scenarios.
    #[must_use]
    pub fn generic(scenario_id: &str) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            display_name: scenario_id.to_string(),
            system_prompt: "You are a professional document analysis assistant. Answer \
                            from the provided documents and say so when they do not \
                            contain the answer."
                .to_string(),
            keyword_library: BTreeMap::new(),
            guidance_markers: words(&["如何", "怎么", "怎样", "建议"]),
            analysis_markers: words(&["分析", "比较", "评估", "判断"]),
            continuation_markers: words(&["（续", "接上"]),
            non_terminal_suffixes: words(&["：", "，"]),
            citation_patterns: vec![
                r"第\s*(\d+)\s*页".to_string(),
                r"第\s*(\d+)\s*条".to_string(),
                r"段落\s*(\d+)".to_string(),
                r"第\s*(\d+)\s*章".to_string(),
                r"附录\s*([A-Z\d]+)".to_string(),
                r"\[(\d+)\]".to_string(),
                r"（第\s*(\d+)\s*页）".to_string(),
            ],
        }
    }

    /// Scans the question against the keyword library and returns the
    /// matched words in library order.
    #[must_use]
    pub fn matched_keywords(&self, question: &str) -> Vec<String> {
        let mut matched = Vec::new();
        for word_list in self.keyword_library.values() {
            for word in word_list {
                if question.contains(word.as_str()) && !matched.contains(word) {
                    matched.push(word.clone());
                }
            }
        }
        matched
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
