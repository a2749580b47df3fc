//! 站点地址与 URL 映射、测试数据准备
//!
//! 基准站点部署在本地地址上，但模型看到的是真实域名（onestopmarket.com 等）：
//! 提示中的 URL 做本地 -> 真实映射，解析出的动作 URL 做真实 -> 本地映射。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 各站点本地地址；空串视为未配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteUrls {
    pub reddit: String,
    pub shopping: String,
    pub shopping_admin: String,
    pub gitlab: String,
    pub wikipedia: String,
    pub map: String,
    pub homepage: String,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self {
            reddit: "http://localhost:9999".to_string(),
            shopping: "http://localhost:7770".to_string(),
            shopping_admin: "http://localhost:7780/admin".to_string(),
            gitlab: "http://localhost:8023".to_string(),
            wikipedia: "http://localhost:8888/wikipedia_en_all_maxi_2022-05/A/User:The_other_Kiwix_guy/Landing".to_string(),
            map: "http://localhost:3000".to_string(),
            homepage: "http://localhost:4399".to_string(),
        }
    }
}

impl SiteUrls {
    /// (站点名, 环境变量, 占位符, 真实域名, 本地地址)
    fn entries(&self) -> [(&'static str, &'static str, &'static str, &'static str, &str); 7] {
        [
            ("reddit", "REDDIT", "__REDDIT__", "http://reddit.com", &self.reddit),
            // SHOPPING_ADMIN 必须先于 SHOPPING 替换
            (
                "shopping_admin",
                "SHOPPING_ADMIN",
                "__SHOPPING_ADMIN__",
                "http://luma.com/admin",
                &self.shopping_admin,
            ),
            ("shopping", "SHOPPING", "__SHOPPING__", "http://onestopmarket.com", &self.shopping),
            ("gitlab", "GITLAB", "__GITLAB__", "http://gitlab.com", &self.gitlab),
            ("wikipedia", "WIKIPEDIA", "__WIKIPEDIA__", "http://wikipedia.org", &self.wikipedia),
            ("map", "MAP", "__MAP__", "http://openstreetmap.org", &self.map),
            ("homepage", "HOMEPAGE", "__HOMEPAGE__", "http://homepage.com", &self.homepage),
        ]
    }

    /// 读取 REDDIT / SHOPPING / ... 环境变量覆盖
    pub fn with_env_overrides(mut self) -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = read("REDDIT") {
            self.reddit = v;
        }
        if let Some(v) = read("SHOPPING") {
            self.shopping = v;
        }
        if let Some(v) = read("SHOPPING_ADMIN") {
            self.shopping_admin = v;
        }
        if let Some(v) = read("GITLAB") {
            self.gitlab = v;
        }
        if let Some(v) = read("WIKIPEDIA") {
            self.wikipedia = v;
        }
        if let Some(v) = read("MAP") {
            self.map = v;
        }
        if let Some(v) = read("HOMEPAGE") {
            self.homepage = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        let missing: Vec<&str> = self
            .entries()
            .iter()
            .filter(|(_, _, _, _, local)| local.trim().is_empty())
            .map(|(_, env, _, _, _)| *env)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::ConfigError(format!(
                "Please setup the URLs to each site, missing: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn url_mapper(&self) -> UrlMapper {
        UrlMapper::new(
            self.entries()
                .iter()
                .map(|(_, _, _, real, local)| (local.to_string(), real.to_string()))
                .collect(),
        )
    }

    /// 替换测试配置中的站点占位符
    pub fn substitute_placeholders(&self, raw: &str) -> String {
        self.entries()
            .iter()
            .fold(raw.to_string(), |acc, (_, _, placeholder, _, local)| {
                acc.replace(placeholder, local)
            })
    }
}

/// 本地地址 <-> 真实域名 的双向映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMapper {
    /// (本地地址, 真实域名)，按本地地址长度降序
    pairs: Vec<(String, String)>,
}

impl UrlMapper {
    pub fn new(mut pairs: Vec<(String, String)>) -> Self {
        pairs.retain(|(local, real)| !local.is_empty() && !real.is_empty());
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { pairs }
    }

    /// 本地 -> 真实（提示中展示给模型）
    pub fn to_real(&self, text: &str) -> String {
        self.pairs
            .iter()
            .fold(text.to_string(), |acc, (local, real)| acc.replace(local, real))
    }

    /// 真实 -> 本地（执行模型给出的 URL）
    pub fn to_local(&self, text: &str) -> String {
        let mut by_real: Vec<&(String, String)> = self.pairs.iter().collect();
        by_real.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        by_real
            .into_iter()
            .fold(text.to_string(), |acc, (local, real)| acc.replace(real, local))
    }
}

/// 由 test.raw.json 生成 test.json 与逐任务的 `<idx>.json`，返回任务数
pub fn split_test_configs(
    sites: &SiteUrls,
    raw_path: &Path,
    out_dir: &Path,
) -> Result<usize, AgentError> {
    let raw = std::fs::read_to_string(raw_path)?;
    let substituted = sites.substitute_placeholders(&raw);
    std::fs::create_dir_all(out_dir)?;
    std::fs::write(out_dir.join("test.json"), &substituted)?;

    let tasks: Vec<serde_json::Value> = serde_json::from_str(&substituted)?;
    for (idx, task) in tasks.iter().enumerate() {
        let path = out_dir.join(format!("{}.json", idx));
        std::fs::write(path, serde_json::to_string_pretty(task)?)?;
    }
    tracing::info!(count = tasks.len(), dir = %out_dir.display(), "test configs generated");
    Ok(tasks.len())
}
