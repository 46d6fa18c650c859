/// Reads a boolean switch from the environment. Unset yields `None`.
pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| {
        let trimmed = val.trim();
        !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
    })
}

pub fn verbose_from_env() -> Option<bool> {
    env_flag("FJ_VERBOSE")
}

pub fn dump_asm_from_env() -> Option<bool> {
    env_flag("FJ_DUMP_ASM")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_are_none() {
        assert_eq!(env_flag("FJ_TEST_SURELY_UNSET_VARIABLE"), None);
    }
}
