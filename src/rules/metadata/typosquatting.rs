use serde_json::Value;

use super::{required_str, MetadataDetector};
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::rules::RuleResult;

/// Well-known PyPI package names for typosquat comparison.
const POPULAR_PYPI_PACKAGES: &[&str] = &[
    "requests",
    "flask",
    "django",
    "numpy",
    "pandas",
    "scipy",
    "boto3",
    "fastapi",
    "uvicorn",
    "httpx",
    "aiohttp",
    "pillow",
    "pydantic",
    "sqlalchemy",
    "celery",
    "redis",
    "psycopg2",
    "pytest",
    "setuptools",
    "cryptography",
    "paramiko",
    "pyyaml",
    "jinja2",
    "beautifulsoup4",
    "selenium",
    "scrapy",
    "tensorflow",
    "transformers",
    "langchain",
    "openai",
    "anthropic",
    "urllib3",
    "colorama",
    "certifi",
];

/// Well-known npm package names for typosquat comparison.
const POPULAR_NPM_PACKAGES: &[&str] = &[
    "express",
    "react",
    "lodash",
    "axios",
    "chalk",
    "commander",
    "next",
    "typescript",
    "webpack",
    "eslint",
    "prettier",
    "jest",
    "mongoose",
    "sequelize",
    "prisma",
    "fastify",
    "socket.io",
    "dotenv",
    "cors",
    "jsonwebtoken",
    "bcrypt",
    "nodemailer",
    "openai",
    "langchain",
    "zod",
    "moment",
    "minimist",
];

/// Flags package names within Levenshtein distance 1-2 of a popular package
/// on the same index, excluding exact matches.
pub struct TyposquatDetector {
    ecosystem: Ecosystem,
}

impl TyposquatDetector {
    pub fn new(ecosystem: Ecosystem) -> Self {
        Self { ecosystem }
    }

    fn popular(&self) -> &'static [&'static str] {
        match self.ecosystem {
            Ecosystem::PyPi => POPULAR_PYPI_PACKAGES,
            Ecosystem::Npm => POPULAR_NPM_PACKAGES,
        }
    }

    fn package_name<'v>(&self, metadata: &'v Value) -> Result<&'v str> {
        match self.ecosystem {
            Ecosystem::PyPi => required_str(metadata, "/info/name"),
            Ecosystem::Npm => required_str(metadata, "/name"),
        }
    }
}

impl MetadataDetector for TyposquatDetector {
    fn name(&self) -> &'static str {
        "typosquatting"
    }

    fn detect(&self, metadata: &Value) -> Result<RuleResult> {
        let name = self.package_name(metadata)?.to_lowercase();

        let mut similar = Vec::new();
        for &popular in self.popular() {
            if name == popular {
                // The package IS the popular one.
                return Ok(RuleResult::Description(String::new()));
            }
            let distance = levenshtein::levenshtein(&name, popular);
            if distance > 0 && distance <= 2 {
                similar.push(popular);
            }
        }

        if similar.is_empty() {
            Ok(RuleResult::Description(String::new()))
        } else {
            Ok(RuleResult::Description(format!(
                "name is within edit distance 2 of popular package(s): {}",
                similar.join(", ")
            )))
        }
    }
}
