//! Chinese to English query translations.
//!
//! Search backends only take English queries. Non-ASCII keyword tokens are
//! looked up here by their exact text; tokens with no entry still take part in
//! scoring but produce no query.

/// Keyword token -> English search query
pub const TRANSLATIONS: &[(&str, &str)] = &[
    // Industrial organization
    ("空调市场", "air conditioner market"),
    ("电动汽车市场", "electric vehicle market"),
    ("电车市场", "EV market"),
    ("耐用消费品", "durable goods"),
    ("实证产业组织", "empirical industrial organization"),
    ("实证 io", "empirical IO"),
    ("实证产业组织学", "empirical industrial organization"),
    ("市场结构", "market structure"),
    ("产品差异化", "product differentiation"),
    ("需求估计", "demand estimation"),
    ("需求估计模型", "demand estimation"),
    ("供给行为", "supply behavior"),
    ("定价策略", "pricing strategy"),
    ("市场势力", "market power"),
    ("福利分析", "welfare analysis"),
    ("家电市场", "appliance market"),
    ("家用电器市场", "home appliance market"),
    ("新能源汽车市场", "new energy vehicle market"),
    ("离散选择模型", "discrete choice model"),
    ("blp 模型", "BLP model"),
    ("blp模型", "BLP model"),
    ("结构估计", "structural estimation"),
    ("结构式估计", "structural estimation"),
    ("寡头竞争", "oligopoly competition"),
    ("寡头垄断", "oligopoly"),
    ("纵向关系", "vertical relationship"),
    ("技术创新", "technological innovation"),
    ("技术变革", "technological change"),
    ("政策评估", "policy evaluation"),
    ("政策评价", "policy evaluation"),
    ("消费行为", "consumer behavior"),
    ("消费者行为", "consumer behavior"),
    // Shipping and environment
    ("北极航道", "Arctic shipping"),
    ("北极航线", "Arctic shipping route"),
    ("北极航运", "Arctic shipping"),
    ("全球航运贸易", "global shipping trade"),
    ("全球海运贸易", "global maritime trade"),
    ("海运碳排放", "maritime carbon emission"),
    ("海洋碳排放", "maritime carbon emission"),
    ("航运减排", "shipping emission reduction"),
    ("船舶碳排放", "vessel carbon emission"),
    ("船舶排放", "vessel emission"),
    ("碳减排政策", "carbon reduction policy"),
    ("碳排放政策", "carbon emission policy"),
    ("航运碳足迹", "shipping carbon footprint"),
    ("绿色航运", "green shipping"),
    ("气候影响", "climate impact"),
    ("气候变化影响", "climate impact"),
    ("国际海运", "international shipping"),
    ("国际航运", "international shipping"),
    ("海运贸易格局", "maritime trade pattern"),
    ("航运贸易", "shipping trade"),
    ("碳税", "carbon tax"),
    ("碳市场", "carbon market"),
    ("碳交易市场", "carbon market"),
    ("船舶能效", "ship energy efficiency"),
    ("船舶能源效率", "ship energy efficiency"),
    ("低碳航运", "low carbon shipping"),
    ("低碳海运", "low carbon shipping"),
    ("北极环境影响", "Arctic environmental impact"),
    ("贸易路线优化", "trade route optimization"),
    ("航线优化", "route optimization"),
    ("可持续航运", "sustainable shipping"),
    ("可持续海运", "sustainable maritime"),
];

/// Look up the English query for a keyword token (exact match)
pub fn translate(token: &str) -> Option<&'static str> {
    TRANSLATIONS
        .iter()
        .find(|(source, _)| *source == token)
        .map(|(_, english)| *english)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_known() {
        assert_eq!(translate("市场结构"), Some("market structure"));
        assert_eq!(translate("碳税"), Some("carbon tax"));
    }

    #[test]
    fn test_translate_is_exact() {
        assert_eq!(translate("市场"), None);
        assert_eq!(translate(" 市场结构"), None);
    }
}
