use chrono::NaiveDate;
use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    pub instructor: String,
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl Course {
    pub fn item(&self, item_id: &str) -> Option<(&Module, &Item)> {
        self.modules
            .iter()
            .find_map(|m| m.items.iter().find(|i| i.id == item_id).map(|i| (m, i)))
    }

    pub fn item_count(&self) -> usize {
        self.modules
            .iter()
            .map(|m| m.items.len())
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub details: ItemDetails,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemDetails {
    #[serde(rename_all = "camelCase")]
    Assignment {
        #[serde(default)]
        description: String,
        #[serde(default)]
        points: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
    },
    #[serde(rename_all = "camelCase")]
    Quiz {
        #[serde(default)]
        questions: Vec<QuizQuestion>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_limit_minutes: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
    },
    #[serde(rename_all = "camelCase")]
    Reading {
        #[serde(default)]
        content: String,
        #[serde(default)]
        key_points: Vec<String>,
        #[serde(default)]
        videos: Vec<Video>,
    },
}

impl ItemDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemDetails::Assignment { .. } => "assignment",
            ItemDetails::Quiz { .. } => "quiz",
            ItemDetails::Reading { .. } => "reading",
        }
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        match self {
            ItemDetails::Assignment { due_date, .. } | ItemDetails::Quiz { due_date, .. } =>
                *due_date,
            ItemDetails::Reading { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub title: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_tag_is_flattened() {
        let raw =
            r#"{"id":"q1","title":"Week 1 Quiz","type":"quiz","questions":[{"question":"2+2?","options":["3","4"],"answerIndex":1}]}"#;
        let item: Item = serde_json::from_str(raw).unwrap();
        assert_eq!(item.details.kind(), "quiz");
        match &item.details {
            ItemDetails::Quiz { questions, .. } => assert_eq!(questions[0].answer_index, Some(1)),
            other => panic!("unexpected item {:?}", other),
        }

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["type"], "quiz");
        assert_eq!(back["title"], "Week 1 Quiz");
    }
}
