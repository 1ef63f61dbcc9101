// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request transformations. Each produces a new request; the input is untouched.

use crate::engine_core::constants::policy::ANONYMIZED_VALUE;
use crate::engine_core::models::{ToolExecutionRequest, Transformation};
use serde_json::Value;

pub fn apply(transformation: &Transformation, request: &ToolExecutionRequest) -> ToolExecutionRequest {
    match transformation {
        Transformation::ReadOnly => {
            // First occurrence only, and only as a substring of the tool name
            request.renamed(request.tool_name().replacen("write", "read", 1))
        }
        Transformation::ParameterFilter { remove } => {
            let mut parameters = request.parameters().clone();
            for name in remove {
                parameters.remove(name);
            }
            request.with_parameters(parameters)
        }
        Transformation::ParameterAnonymize { fields } => {
            let mut parameters = request.parameters().clone();
            for name in fields {
                if let Some(value) = parameters.get_mut(name) {
                    *value = Value::String(ANONYMIZED_VALUE.to_string());
                }
            }
            request.with_parameters(parameters)
        }
    }
}
