/// 一次 (key, 模型) 尝试。整张计划在调用开始时一次性生成，按顺序线性消费。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    /// key 在本次池顺序中的位置（0 起）。
    pub credential_index: usize,
    pub credential: String,
    pub model_index: usize,
    pub model: String,
    /// 该 key 的最后一个模型：这里再耗尽就算整把 key 耗尽。
    pub last_model: bool,
}

/// key 为主序、模型为次序展开。
pub fn plan_attempts(pool: &[String], models: &[String]) -> Vec<GenerationAttempt> {
    let mut plan = Vec::with_capacity(pool.len() * models.len());
    for (ci, credential) in pool.iter().enumerate() {
        for (mi, model) in models.iter().enumerate() {
            plan.push(GenerationAttempt {
                credential_index: ci,
                credential: credential.clone(),
                model_index: mi,
                model: model.clone(),
                last_model: mi + 1 == models.len(),
            });
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plan_is_credential_major() {
        let plan = plan_attempts(&strings(&["k1", "k2"]), &strings(&["fast", "pro"]));
        let pairs: Vec<(&str, &str)> = plan
            .iter()
            .map(|a| (a.credential.as_str(), a.model.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("k1", "fast"), ("k1", "pro"), ("k2", "fast"), ("k2", "pro")]
        );
        assert!(!plan[0].last_model);
        assert!(plan[1].last_model);
        assert_eq!(plan[3].credential_index, 1);
        assert_eq!(plan[3].model_index, 1);
    }

    #[test]
    fn empty_inputs_give_empty_plan() {
        assert!(plan_attempts(&[], &strings(&["m"])).is_empty());
        assert!(plan_attempts(&strings(&["k"]), &[]).is_empty());
    }
}
