//! Keyword intent classifier and canned replies for the chat assistant.
//!
//! Used when no language-model backend answers. Categories are checked in a
//! fixed priority order and the first one with a matching keyword wins.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::record::DietRecord;
use crate::stats::HealthContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Health,
    Training,
    Diet,
    AlertQuery,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Training => "training",
            Self::Diet => "diet",
            Self::AlertQuery => "alert_query",
            Self::General => "general",
        }
    }
}

/// Priority order matters: "生病了不吃饭" is a health question, not a diet one.
const KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Health,
        &[
            "健康", "生病", "症状", "不舒服", "呕吐", "吐了", "拉肚子", "腹泻", "便秘", "发烧", "咳嗽",
            "疫苗", "驱虫", "看医生", "兽医", "精神不好", "sick", "health", "vomit",
            "diarrhea", "fever", "vet", "vaccine",
        ],
    ),
    (
        Intent::Training,
        &[
            "训练", "技巧", "教", "训狗", "坐下", "握手", "定点", "上厕所", "咬人", "乱叫", "叫个不停",
            "服从", "train", "training", "sit", "obedience", "bark", "leash",
        ],
    ),
    (
        Intent::Diet,
        &[
            "吃", "喂", "饮食", "狗粮", "零食", "食物", "热量", "卡路里", "体重", "food", "feed",
            "diet", "eat", "treat", "calorie", "weight",
        ],
    ),
    (
        Intent::AlertQuery,
        &["预警", "异常", "警告", "提醒", "alert", "warning", "anomal"],
    ),
];

static MATCHERS: LazyLock<Vec<(Intent, Regex)>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .filter_map(|(intent, words)| {
            let pattern = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .ok()
                .map(|re| (*intent, re))
        })
        .collect()
});

/// Classify free text into an [`Intent`]. No match means `General`.
pub fn classify(text: &str) -> Intent {
    MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

/// Facts available to templated replies.
#[derive(Debug, Clone, Default)]
pub struct ReplyContext {
    pub pet_name: String,
    /// `None` when unknown; training advice then assumes a young adult.
    pub age_months: Option<u32>,
    pub open_alerts: usize,
    pub last_meal: Option<DietRecord>,
    pub health: HealthContext,
    /// From [`health_concerns`](crate::stats::health_concerns).
    pub concerns: Vec<String>,
}

const DEFAULT_AGE_MONTHS: u32 = 12;

fn training_plan(age_months: u32) -> &'static str {
    if age_months < 6 {
        "幼犬期训练：\n\
         1. 基础指令：坐下、趴下、等待\n\
         2. 如厕训练：固定地点排便\n\
         3. 社交训练：多接触不同的人和狗"
    } else if age_months < 18 {
        "成长期训练：\n\
         1. 进阶指令：握手、转圈、装死\n\
         2. 行为纠正：不乱叫、不咬东西\n\
         3. 运动训练：接球、飞盘"
    } else {
        "成年期训练：\n\
         1. 保持性训练：复习已学指令\n\
         2. 新技能学习：根据兴趣选择\n\
         3. 智力游戏：益智玩具、寻物游戏"
    }
}

/// Canned or templated reply for an intent.
pub fn canned_reply(intent: Intent, ctx: &ReplyContext) -> String {
    let name = if ctx.pet_name.is_empty() {
        "狗狗"
    } else {
        ctx.pet_name.as_str()
    };
    match intent {
        Intent::Health => {
            let mut reply = format!("根据{name}最近的记录：\n\n");
            if ctx.concerns.is_empty() {
                reply.push_str("整体健康状况良好，继续保持。\n\n");
            } else {
                for concern in &ctx.concerns {
                    reply.push_str(&format!("注意：{concern}\n"));
                }
                reply.push('\n');
            }
            reply.push_str(
                "建议：\n1. 保持规律的饮食和运动\n2. 注意观察便便健康情况\n\
                 3. 出现持续呕吐、腹泻、发烧或精神萎靡时，请尽快联系兽医",
            );
            reply
        }
        Intent::Training => format!(
            "根据{name}的年龄，推荐以下训练：\n\n{}\n\n\
             训练技巧：每次 10-15 分钟，用零食和夸奖及时奖励正确行为，保持耐心和一致性。",
            training_plan(ctx.age_months.unwrap_or(DEFAULT_AGE_MONTHS))
        ),
        Intent::Diet => match ctx.last_meal {
            Some(ref meal) => format!(
                "{name}最近一次进食是 {}：{} {} 克，最近 {} 餐平均每餐 {:.0} 克。\
                 建议定时定量喂食，零食不超过每日热量的 10%，并保证充足饮水。",
                meal.feed_time,
                meal.food_type,
                meal.amount,
                ctx.health.diet_count,
                ctx.health.avg_amount
            ),
            None => format!(
                "还没有{name}的饮食记录。建议定时定量喂食，零食不超过每日热量的 10%，\
                 并在健康日志里记录每一餐。"
            ),
        },
        Intent::AlertQuery => match ctx.open_alerts {
            0 => format!("目前没有未处理的预警，{name}的状态看起来不错！"),
            n => format!("{name}目前有 {n} 条未处理的预警，请在预警列表中查看详情。"),
        },
        Intent::General => format!(
            "我是{name}的宠物助手，可以回答健康、训练和饮食方面的问题，\
             也可以帮你查看异常预警。"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_health() {
        assert_eq!(classify("我的狗狗最近总是生病"), Intent::Health);
    }

    #[test]
    fn test_classify_general() {
        assert_eq!(classify("今天天气不错"), Intent::General);
        assert_eq!(classify(""), Intent::General);
    }

    #[test]
    fn test_classify_each_category() {
        assert_eq!(classify("怎么教它坐下"), Intent::Training);
        assert_eq!(classify("每天喂多少狗粮合适"), Intent::Diet);
        assert_eq!(classify("最近有什么预警吗"), Intent::AlertQuery);
    }

    #[test]
    fn test_classify_original_keywords() {
        for text in ["狗狗健康吗", "好像生病了", "狗狗有什么症状"] {
            assert_eq!(classify(text), Intent::Health, "{text}");
        }
        for text in ["想开始训练", "有什么小技巧", "怎么教狗狗"] {
            assert_eq!(classify(text), Intent::Training, "{text}");
        }
        for text in ["饮食要注意什么", "一天吃几顿", "什么食物不能给"] {
            assert_eq!(classify(text), Intent::Diet, "{text}");
        }
        for text in ["有预警吗", "帮我设个提醒", "有没有异常"] {
            assert_eq!(classify(text), Intent::AlertQuery, "{text}");
        }
    }

    #[test]
    fn test_health_reply_lists_concerns() {
        let ctx = ReplyContext {
            pet_name: "考拉".into(),
            concerns: vec!["最近饮食量偏少，建议增加喂食量".into()],
            ..Default::default()
        };
        let reply = canned_reply(Intent::Health, &ctx);
        assert!(reply.contains("注意：最近饮食量偏少"));
        assert!(!reply.contains("整体健康状况良好"));

        let reply = canned_reply(Intent::Health, &ReplyContext::default());
        assert!(reply.contains("整体健康状况良好"));
    }

    #[test]
    fn test_training_reply_depends_on_age() {
        let reply = |age_months| {
            canned_reply(
                Intent::Training,
                &ReplyContext {
                    age_months,
                    ..Default::default()
                },
            )
        };
        assert!(reply(Some(3)).contains("幼犬期"));
        assert!(reply(Some(12)).contains("成长期"));
        assert!(reply(Some(36)).contains("成年期"));
        assert!(reply(None).contains("成长期"));
    }

    #[test]
    fn test_priority_order_wins() {
        // Mentions both health and diet keywords.
        assert_eq!(classify("生病了不吃东西"), Intent::Health);
        // Training before diet.
        assert_eq!(classify("训练的时候给零食"), Intent::Training);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("Is my dog SICK?"), Intent::Health);
        assert_eq!(classify("Any ALERTS today"), Intent::AlertQuery);
    }

    #[test]
    fn test_diet_reply_uses_last_meal() {
        let ctx = ReplyContext {
            pet_name: "考拉".into(),
            last_meal: Some(DietRecord {
                food_type: "kibble".into(),
                amount: 100.0,
                feed_time: "2024-01-01T08:00".into(),
                ..Default::default()
            }),
            health: HealthContext {
                diet_count: 3,
                avg_amount: 123.4,
                ..Default::default()
            },
            ..Default::default()
        };
        let reply = canned_reply(Intent::Diet, &ctx);
        assert!(reply.contains("考拉"));
        assert!(reply.contains("kibble"));
        assert!(reply.contains("2024-01-01T08:00"));
        assert!(reply.contains("最近 3 餐平均每餐 123 克"));
    }

    #[test]
    fn test_alert_reply_counts() {
        let ctx = ReplyContext {
            pet_name: "考拉".into(),
            open_alerts: 2,
            ..Default::default()
        };
        assert!(canned_reply(Intent::AlertQuery, &ctx).contains('2'));
        let ctx = ReplyContext {
            open_alerts: 0,
            ..ctx
        };
        assert!(canned_reply(Intent::AlertQuery, &ctx).contains("没有"));
    }
}
