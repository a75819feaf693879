//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nl_sql_assistant::embeddings::EmbeddingProvider;
use nl_sql_assistant::error::{AppError, AppResult};
use nl_sql_assistant::llm::CompletionProvider;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DIMENSIONS: usize = 4;

const KEYWORDS: [&str; 3] = ["customer", "order", "product"];

pub const SHOP_DUMP: &str = r#"
-- MySQL dump 10.13  Distrib 8.0.36
/*!40101 SET NAMES utf8mb4 */;

DROP TABLE IF EXISTS `customers`;
CREATE TABLE `customers` (
  `id` int NOT NULL AUTO_INCREMENT,
  `name` varchar(100) NOT NULL,
  `email` varchar(255) DEFAULT NULL,
  PRIMARY KEY (`id`),
  UNIQUE KEY `uniq_email` (`email`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;

LOCK TABLES `customers` WRITE;
INSERT INTO `customers` VALUES (1,'Ada','ada@example.com'),(2,'Grace',NULL);
UNLOCK TABLES;

DROP TABLE IF EXISTS `orders`;
CREATE TABLE `orders` (
  `id` int NOT NULL,
  `customer_id` int NOT NULL,
  `total` decimal(8,2) DEFAULT NULL,
  PRIMARY KEY (`id`),
  KEY `idx_customer` (`customer_id`),
  CONSTRAINT `fk_orders_customer` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;

LOCK TABLES `orders` WRITE;
INSERT INTO `orders` VALUES (10,1,'19.99'),(11,2,'5.00'),(12,1,'42.00');
UNLOCK TABLES;
"#;

/// Write [`SHOP_DUMP`] into `dir`.
pub fn write_dump(dir: &Path) -> PathBuf {
    let path = dir.join("shop.sql");
    std::fs::write(&path, SHOP_DUMP).unwrap();
    path
}

/// Embeds text by counting domain keywords, so questions land near the
/// tables they mention.
pub struct KeywordEmbedder;

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    let mut vector: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| text.matches(k).count() as f32)
        .collect();
    vector.push(0.1);
    vector
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// Always fails, like an API call with a revoked key.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
        Err(AppError::embedding("API returned 401 Unauthorized"))
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::embedding("API returned 401 Unauthorized"))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Replies with a canned answer and records every prompt it receives.
pub struct ScriptedCompletion {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply in the expected JSON shape.
    pub fn sql(sql: &str, explanation: &str) -> Self {
        Self::new(serde_json::json!({ "sql": sql, "explanation": explanation }).to_string())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
